//! Order command - layer compile groups and bundle write groups

use super::load_builder;
use anyhow::Result;
use std::path::Path;

pub fn run(manifest: Option<&Path>, json: bool) -> Result<()> {
    let builder = load_builder(manifest)?;
    let graph = builder.resolver().graph();
    let bundles = builder.bundles();

    let layer_groups: Vec<Vec<String>> = builder
        .layer_groups()?
        .into_iter()
        .map(|group| group.into_iter().map(|h| graph.layer(h).key.to_string()).collect())
        .collect();
    let bundle_groups: Vec<Vec<String>> = bundles
        .build_groups()?
        .into_iter()
        .map(|group| group.into_iter().map(|id| bundles.get(id).name.to_string()).collect())
        .collect();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "layers": layer_groups,
                "bundles": bundle_groups,
            })
        );
        return Ok(());
    }

    println!("Layers:");
    for (i, group) in layer_groups.iter().enumerate() {
        println!("  {}: {}", i + 1, group.join(", "));
    }
    println!("Bundles:");
    for (i, group) in bundle_groups.iter().enumerate() {
        println!("  {}: {}", i + 1, group.join(", "));
    }
    Ok(())
}
