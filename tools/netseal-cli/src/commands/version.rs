//! Version command.

use anyhow::Result;
use netseal_core::{version_label, VersionInfo};

use super::VersionArgs;
use crate::context::Context;

/// Run the version command.
pub async fn run(args: VersionArgs, ctx: &Context) -> Result<()> {
    let root = ctx.bundle_root(args.bundle.as_deref());
    let path = ctx.version_file(&root);
    let info = VersionInfo::load(&path);

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "netseal": env!("CARGO_PKG_VERSION"),
            "label": version_label(info.as_ref()),
            "bundle": info,
        }));
        return Ok(());
    }

    ctx.output.header(&version_label(info.as_ref()));
    ctx.output.kv("netseal", env!("CARGO_PKG_VERSION"));
    ctx.output.kv("metadata", &path.display().to_string());

    let Some(info) = info else {
        ctx.output.warn("No bundle version metadata found");
        return Ok(());
    };

    if let Some(name) = &info.release_name {
        ctx.output.kv("release", name);
    }
    if let Some(date) = info.release_date {
        ctx.output.kv("released", &date.format("%Y-%m-%d").to_string());
    }
    if let Some(url) = &info.source_url {
        ctx.output.kv("source", url);
    }
    if let Some(at) = info.downloaded_at {
        ctx.output.kv("downloaded", &at.format("%Y-%m-%d %H:%M UTC").to_string());
    }

    Ok(())
}
