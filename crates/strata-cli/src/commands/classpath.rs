//! Classpath command - print what a layer sees

use super::load_builder;
use anyhow::{bail, Result};
use std::path::Path;
use strata_build::QualifiedName;

pub struct ClasspathArgs<'a> {
    pub manifest: Option<&'a Path>,
    /// `variant:name`
    pub layer: String,
    pub runtime: bool,
    pub file_names: bool,
    pub json: bool,
}

pub fn run(args: ClasspathArgs<'_>) -> Result<()> {
    let Some((variant, name)) = args.layer.split_once(':') else {
        bail!("Layer must be given as VARIANT:LAYER, got '{}'", args.layer);
    };
    let key = QualifiedName::new(variant, name);

    let builder = load_builder(args.manifest)?;
    let resolver = builder.resolver();

    if args.file_names {
        let names = if args.runtime {
            resolver.runtime_file_names(&key)?
        } else {
            resolver.resolve_compile_visibility(&key)?.library_file_names().join(";")
        };
        println!("{}", names);
        return Ok(());
    }

    let classpath = if args.runtime {
        resolver.resolve_runtime_visibility(&key)?
    } else {
        resolver.resolve_compile_visibility(&key)?
    };

    if args.json {
        let layers: Vec<String> = classpath.layers.iter().map(ToString::to_string).collect();
        let libraries: Vec<String> = classpath.libraries.iter().map(ToString::to_string).collect();
        println!(
            "{}",
            serde_json::json!({
                "layer": key.to_string(),
                "visibility": if args.runtime { "runtime" } else { "compile" },
                "layers": layers,
                "libraries": libraries,
            })
        );
    } else {
        for layer in &classpath.layers {
            println!("layer   {}", layer);
        }
        for library in &classpath.libraries {
            println!("library {}", library);
        }
    }
    Ok(())
}
