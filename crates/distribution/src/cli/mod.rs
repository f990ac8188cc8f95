pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Build, Keygen, Publish, Retain, Run, Verify, Version};
