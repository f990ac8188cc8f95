use crate::bundler::PackageBundles;
use crate::structure::{Directory, IndexFormat, Node};

use super::{date, AssemblyError, BuildContext};

/// `<package>/date/...`
pub(crate) fn build(
    ctx: &BuildContext,
    package: &str,
    bundles: &PackageBundles,
) -> Result<Node, AssemblyError> {
    let mut dates = Directory::new(&ctx.config.paths.date);
    for (day, day_bundles) in &bundles.dates {
        dates.add(date::build(ctx, *day, day_bundles)?)?;
    }

    tracing::debug!(package, dates = bundles.dates.len(), "built package subtree");

    let dates = ctx.indexed(dates, ctx.config.indexing.date, IndexFormat::Strings);
    Ok(Node::directory(Directory::new(package).with_child(dates)?))
}
