//! Check command - validate without writing archives

use super::load_builder;
use anyhow::{Context, Result};
use std::path::Path;

pub fn run(manifest: Option<&Path>, json: bool) -> Result<()> {
    let builder = load_builder(manifest)?;
    let report = builder.check().context("Check failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "OK: {} variants, {} layers, {} bundles",
            report.variants, report.layers, report.bundles
        );
    }
    Ok(())
}
