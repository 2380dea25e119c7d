//! hs-sweep: plan hyperparameter sweeps from a JSON space definition.
//!
//! Usage:
//!   hs-sweep random <space.json> <count> [--seed N] [--out DIR]
//!   hs-sweep optimizer <space.json> <optimizer.json> [--out FILE]
//!   hs-sweep inspect <space.json>
//!
//! Both planning commands can also embed their output into copies of a base
//! zip bundle with `--bundle`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hs_experiment::{BundlePackager, BundleRef, ZipBundlePackager};
use hs_search::{OptimizerConfigBuilder, OptimizerSettings, ParameterSpace, RandomSampler, SpaceDefinition};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hs-sweep")]
#[command(about = "Plan random-search and optimizer-driven hyperparameter sweeps")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample concrete assignments uniformly from the space
    Random {
        /// Space definition file
        space: PathBuf,

        /// Number of assignments to draw
        count: usize,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Directory receiving one JSON file per assignment
        #[arg(short, long, default_value = "sweep")]
        out: PathBuf,

        /// Base execution command; prints the full command per run
        #[arg(long)]
        command: Option<String>,

        /// Base zip bundle to embed each assignment into
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Output directory for packaged bundles
        #[arg(long, default_value = "bundles")]
        bundle_dir: PathBuf,
    },

    /// Build the configuration document for the remote optimizer
    Optimizer {
        /// Space definition file
        space: PathBuf,

        /// Optimizer settings file (run_budget, objective, time_unit, goal)
        settings: PathBuf,

        /// Output document file
        #[arg(short, long, default_value = "optimizer_config.json")]
        out: PathBuf,

        /// Base zip bundle to embed the document into
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Output directory for the packaged bundle
        #[arg(long, default_value = "bundles")]
        bundle_dir: PathBuf,
    },

    /// Show the parameters of a space and the size of its grid
    Inspect {
        /// Space definition file
        space: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Random {
            space,
            count,
            seed,
            out,
            command,
            bundle,
            bundle_dir,
        } => {
            let space = load_space(&space)?;
            let mut sampler = match seed {
                Some(seed) => RandomSampler::seeded(seed),
                None => RandomSampler::new(),
            };
            let assignments = sampler.generate(&space, count)?;

            fs::create_dir_all(&out)
                .with_context(|| format!("creating output directory {}", out.display()))?;
            let packager = ZipBundlePackager::new(bundle_dir);
            let base = bundle.map(BundleRef::new);

            for (index, assignment) in assignments.iter().enumerate() {
                let run_name = format!("run_{}", index + 1);
                let path = out.join(format!("{run_name}.json"));
                fs::write(&path, serde_json::to_string_pretty(assignment)?)
                    .with_context(|| format!("writing {}", path.display()))?;

                if let Some(base) = &base {
                    let packaged = packager.embed_assignment(base, &run_name, assignment)?;
                    println!("{run_name}: {packaged}");
                }
                if let Some(command) = &command {
                    println!("{run_name}: {}", assignment.command_line(command));
                }
            }

            info!(assignments = assignments.len(), out = %out.display(), "random sweep planned");
        }

        Commands::Optimizer {
            space,
            settings,
            out,
            bundle,
            bundle_dir,
        } => {
            let space = load_space(&space)?;
            let text = fs::read_to_string(&settings)
                .with_context(|| format!("reading optimizer settings {}", settings.display()))?;
            let settings: OptimizerSettings = serde_json::from_str(&text)
                .with_context(|| format!("parsing optimizer settings {}", settings.display()))?;

            let document = OptimizerConfigBuilder::from_settings(settings).build(&space)?;
            fs::write(&out, serde_json::to_string_pretty(&document)?)
                .with_context(|| format!("writing {}", out.display()))?;

            if let Some(base) = bundle {
                let packager = ZipBundlePackager::new(bundle_dir);
                let packaged = packager.embed_optimizer_config(&BundleRef::new(base), "hpo", &document)?;
                println!("bundle: {packaged}");
            }

            info!(
                descriptors = document.hyper_parameters.len(),
                out = %out.display(),
                "optimizer config written"
            );
        }

        Commands::Inspect { space } => {
            let space = load_space(&space)?;
            for param in &space {
                let candidates = param
                    .candidate_count()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|e| format!("error: {e}"));
                println!(
                    "{:<24} {:<14} {:<8} {} candidates",
                    param.name,
                    format!("{:?}", param.kind.category()),
                    param.value_kind().to_string(),
                    candidates
                );
            }
            match space.grid_size() {
                Some(size) => println!("grid size: {size}"),
                None => println!("grid size: overflows u64"),
            }
        }
    }

    Ok(())
}

fn load_space(path: &Path) -> Result<ParameterSpace> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading space definition {}", path.display()))?;
    let definition = SpaceDefinition::from_json_str(&text)
        .with_context(|| format!("parsing space definition {}", path.display()))?;
    Ok(definition.into_space()?)
}
