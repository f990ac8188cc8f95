use chrono::NaiveDate;

use crate::bundler::{DateBundles, KeyBundle};
use crate::structure::{Directory, IndexFormat, Node};

use super::{AssemblyError, BuildContext};

/// `<date>/export.zip` plus, inside the hour horizon, `<date>/hour/<h>/export.zip`.
pub(crate) fn build(
    ctx: &BuildContext,
    date: NaiveDate,
    bundles: &DateBundles,
) -> Result<Node, AssemblyError> {
    let mut dir = Directory::new(date.format("%Y-%m-%d").to_string());
    for archive in ctx.export_archives(&bundles.daily)? {
        dir.add(archive)?;
    }

    if ctx.includes_hours(date) {
        let mut hours = Directory::new(&ctx.config.paths.hour);
        for (hour, bundle) in &bundles.hours {
            hours.add(hour_node(ctx, *hour, bundle)?)?;
        }
        dir.add(ctx.indexed(hours, ctx.config.indexing.hour, IndexFormat::Integers))?;
    }

    Ok(Node::directory(dir))
}

fn hour_node(ctx: &BuildContext, hour: u32, bundle: &KeyBundle) -> Result<Node, AssemblyError> {
    let mut dir = Directory::new(hour.to_string());
    for archive in ctx.export_archives(bundle)? {
        dir.add(archive)?;
    }
    Ok(Node::directory(dir))
}
