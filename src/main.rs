use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::DynamicImage;
use serde_json::json;

use shelf_audit::core_modules::utils::image_helper::image_helper;
use shelf_audit::{AuditConfig, AuditJob, AuditPipeline, AuditWorkerPool, FidelityMode};

#[derive(Parser)]
#[command(name = "shelf_audit")]
#[command(about = "Audit shelf photographs against inventory manifests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit one image against one manifest and print the result as JSON.
    Audit {
        image: PathBuf,
        manifest: PathBuf,

        /// `full` (pixel analysis) or `reduced` (header only, placeholder layout).
        #[arg(long, default_value_t = FidelityMode::Full)]
        mode: FidelityMode,

        #[arg(long)]
        pretty: bool,
    },
    /// Audit image/manifest pairs concurrently and print a JSON array.
    Batch {
        /// Alternating image and manifest paths.
        #[arg(required = true, num_args = 2..)]
        pairs: Vec<PathBuf>,

        /// Worker count; defaults to the number of CPUs.
        #[arg(long)]
        workers: Option<usize>,

        #[arg(long, default_value_t = FidelityMode::Full)]
        mode: FidelityMode,
    },
    /// Write the synthetic 800x600 test shelf.
    Sample {
        output: PathBuf,

        /// Also write a matching 25-line manifest here.
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the JSON results, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Audit {
            image,
            manifest,
            mode,
            pretty,
        } => {
            let pipeline = AuditPipeline::new(AuditConfig { mode });
            let result = pipeline
                .run_files(&image, &manifest)
                .with_context(|| format!("auditing {}", image.display()))?;
            let out = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{out}");
        }
        Commands::Batch {
            pairs,
            workers,
            mode,
        } => {
            if pairs.len() % 2 != 0 {
                bail!("batch expects image/manifest pairs, got {} paths", pairs.len());
            }
            let jobs: Vec<AuditJob> = pairs
                .chunks_exact(2)
                .map(|pair| AuditJob::new(&pair[0], &pair[1]))
                .collect();

            let config = AuditConfig { mode };
            let pool = match workers {
                Some(n) => AuditWorkerPool::with_workers(config, n),
                None => AuditWorkerPool::new(config),
            };
            tracing::info!(jobs = jobs.len(), workers = pool.worker_count(), "starting batch");

            let results = pool.audit_batch(jobs).await;
            pool.shutdown().await;

            let entries = results
                .into_iter()
                .map(|outcome| match outcome {
                    Ok(result) => serde_json::to_value(result),
                    Err(e) => Ok(json!({ "error": e.to_string() })),
                })
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Commands::Sample { output, manifest } => {
            let shelf = DynamicImage::ImageRgb8(image_helper::sample_shelf());
            image_helper::save(&output, &shelf)
                .with_context(|| format!("writing {}", output.display()))?;
            tracing::info!(path = %output.display(), "sample shelf written");

            if let Some(path) = manifest {
                std::fs::write(&path, image_helper::sample_manifest())
                    .with_context(|| format!("writing {}", path.display()))?;
                tracing::info!(path = %path.display(), "sample manifest written");
            }
        }
    }

    Ok(())
}
