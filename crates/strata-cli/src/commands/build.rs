//! Build command - write bundle archives

use super::load_builder;
use anyhow::{Context, Result};
use std::path::Path;

/// Build command arguments
pub struct BuildArgs<'a> {
    pub manifest: Option<&'a Path>,
    /// Bundles to build; empty builds every bundle
    pub bundles: Vec<String>,
    pub json: bool,
    pub quiet: bool,
}

/// Run the build command
pub fn run(args: BuildArgs<'_>) -> Result<()> {
    let builder = load_builder(args.manifest)?;
    let context = builder.build(&args.bundles).context("Build failed")?;

    if args.json {
        let bundles: Vec<serde_json::Value> = context
            .bundles
            .iter()
            .map(|b| {
                serde_json::json!({
                    "name": b.name,
                    "kind": b.kind,
                    "path": b.archive.path,
                    "entries": b.archive.entries,
                    "size": b.archive.size,
                    "shaded": b.shaded,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "total_time": context.stats.total_time.as_secs_f64(),
                "layers": context.stats.layers,
                "bundle_groups": context.stats.bundle_groups,
                "bundles": bundles,
            })
        );
    } else if !args.quiet {
        for bundle in &context.bundles {
            println!(
                "  {:<28} {:<9} {} ({} entries)",
                bundle.name,
                bundle.kind,
                bundle.archive.path.display(),
                bundle.archive.entries
            );
        }
        println!(
            "Built {} bundles in {:.2}s",
            context.stats.bundles,
            context.stats.total_time.as_secs_f64()
        );
    }

    Ok(())
}
