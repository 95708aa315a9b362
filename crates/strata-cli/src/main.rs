use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use strata_build::BuildError;

mod commands;
mod logging;

/// Layered classpath composition and bundle assembly.
///
/// Reads strata.toml (searched upward from the working directory), resolves
/// the layer graph and writes one archive per declared bundle.
///
/// EXAMPLES:
///     strata build                          Build every bundle
///     strata build --bundle universal       Build one bundle and its inputs
///     strata classpath common:main          Print a layer's compile classpath
///     strata order                          Print layer and bundle build order
///
/// ENVIRONMENT VARIABLES:
///     STRATA_REPOSITORY        Library repository override
///     STRATA_OUTPUT_DIR        Archive output directory override
///     STRATA_CLASSES_DIR       Compiled layer output root override
///     STRATA_STRICT_VERSIONS   Fail on shaded/provided version mismatches
///     RUST_LOG                 Log filter (default: warn)
#[derive(Parser)]
#[command(name = "strata")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to strata.toml
    #[arg(long, short = 'm', global = true, env = "STRATA_MANIFEST")]
    manifest: Option<PathBuf>,
    /// Verbose output (debug logging)
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet output (errors only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write bundle archives
    ///
    /// Bundles are written in dependency order; a selected bundle brings the
    /// bundles it inlines or nests along.
    ///
    /// EXAMPLES:
    ///     strata build
    ///     strata build --bundle forge:universal --json
    #[command(visible_alias = "b")]
    Build {
        /// Bundle to build (`variant:name` or `name`); repeatable
        #[arg(long, short = 'b')]
        bundle: Vec<String>,
        /// JSON output
        #[arg(long, env = "STRATA_JSON")]
        json: bool,
    },

    /// Validate the manifest, layer graph and bundle library selection
    #[command(visible_alias = "c")]
    Check {
        /// JSON output
        #[arg(long, env = "STRATA_JSON")]
        json: bool,
    },

    /// Print the classpath visible to a layer
    ///
    /// EXAMPLES:
    ///     strata classpath common:main
    ///     strata classpath forge:launch --runtime --file-names
    Classpath {
        /// Layer as `variant:name`
        layer: String,
        /// Runtime visibility instead of compile visibility
        #[arg(long)]
        runtime: bool,
        /// Only library file names, joined with `;`
        #[arg(long)]
        file_names: bool,
        /// JSON output
        #[arg(long, env = "STRATA_JSON")]
        json: bool,
    },

    /// Print layer compile order and bundle write order
    Order {
        /// JSON output
        #[arg(long, env = "STRATA_JSON")]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::from(exit_code(&error))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let manifest = cli.manifest.as_deref();
    match cli.command {
        Commands::Build { bundle, json } => commands::build::run(commands::build::BuildArgs {
            manifest,
            bundles: bundle,
            json,
            quiet: cli.quiet,
        }),
        Commands::Check { json } => commands::check::run(manifest, json),
        Commands::Classpath {
            layer,
            runtime,
            file_names,
            json,
        } => commands::classpath::run(commands::classpath::ClasspathArgs {
            manifest,
            layer,
            runtime,
            file_names,
            json,
        }),
        Commands::Order { json } => commands::order::run(manifest, json),
    }
}

/// 2 for I/O failures while assembling, 1 for everything else
fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<BuildError>())
        .map_or(1, BuildError::exit_code)
}
