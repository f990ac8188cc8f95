use crate::structure::{Directory, EntryArchive, Node, SigningDecorator};

use super::{AssemblyError, BuildContext};

/// `configuration/<app_config>`: the opaque client configuration, signed
/// like any key archive.
pub(crate) fn build(ctx: &BuildContext, payload: Vec<u8>) -> Result<Node, AssemblyError> {
    let paths = &ctx.config.paths;
    let mut archive = EntryArchive::new(&paths.app_config);
    archive.add(ctx.codec.config().payload_entry.clone(), payload)?;

    let signed = SigningDecorator::new(archive, ctx.signer.clone(), ctx.codec.clone());
    let dir = Directory::new(&paths.configuration).with_child(Node::archive(signed))?;
    Ok(Node::directory(dir))
}
