use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ferry_core::{LocalStoreFactory, PipelineConfig, RunContext, UploadPipeline};

/// ferry - background artifact uploads
#[derive(Parser)]
#[command(name = "ferry")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files into a local-directory object store
    Upload {
        /// Root directory of the store
        #[arg(long)]
        root: PathBuf,

        /// Container (bucket) name under the root
        #[arg(long, default_value = "artifacts")]
        container: String,

        /// Pipeline config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "run")]
        run_name: String,

        /// Object name format, e.g. "{run_name}/{artifact_name}"
        #[arg(long)]
        format: Option<String>,

        /// Number of upload workers
        #[arg(long)]
        workers: Option<usize>,

        /// Fail instead of replacing objects that already exist
        #[arg(long)]
        no_overwrite: bool,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Upload {
            root,
            container,
            config,
            run_name,
            format,
            workers,
            no_overwrite,
            files,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_json_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if let Some(format) = format {
                config.object_name_format = format;
            }
            if let Some(workers) = workers {
                config.num_workers = workers;
            }
            let factory = LocalStoreFactory::new(root, container);
            upload(config, factory, RunContext::new(run_name), files, !no_overwrite).await
        }
    }
}

async fn upload(
    config: PipelineConfig,
    factory: LocalStoreFactory,
    run: RunContext,
    files: Vec<PathBuf>,
    overwrite: bool,
) -> Result<()> {
    let mut pipeline = UploadPipeline::new(config, Arc::new(factory))?;
    pipeline.start(run).await?;

    // worker のクラッシュは submit のたびに確認する
    let mut uris = Vec::with_capacity(files.len());
    for file in &files {
        let artifact_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("not a file name: {}", file.display()))?;
        if let Err(e) = pipeline.check_health() {
            if let Err(shutdown) = pipeline.shutdown().await {
                warn!(error = %shutdown, "shutdown after worker crash failed");
            }
            return Err(e.into());
        }
        pipeline
            .submit(artifact_name, file, overwrite)
            .await
            .with_context(|| format!("submitting {}", file.display()))?;
        uris.push(pipeline.resolve_uri(artifact_name)?);
    }

    let health = pipeline.check_health();
    let shutdown = pipeline.shutdown().await;
    health?;
    shutdown?;

    let counts = pipeline.counts().await;
    info!(uploaded = counts.uploaded, failed = counts.failed, "done");
    for uri in uris {
        println!("{uri}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn upload_requires_files() {
        assert!(Cli::try_parse_from(["ferry", "upload", "--root", "/tmp/store"]).is_err());

        let cli = Cli::try_parse_from([
            "ferry",
            "upload",
            "--root",
            "/tmp/store",
            "--workers",
            "2",
            "--no-overwrite",
            "a.txt",
            "b.txt",
        ])
        .unwrap();
        let Commands::Upload {
            workers,
            no_overwrite,
            files,
            container,
            ..
        } = cli.command;
        assert_eq!(workers, Some(2));
        assert!(no_overwrite);
        assert_eq!(files.len(), 2);
        assert_eq!(container, "artifacts");
    }

    fn local_config() -> PipelineConfig {
        PipelineConfig {
            num_workers: 2,
            poll_interval_ms: 20,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upload_copies_files_into_the_store() {
        let work = tempfile::TempDir::new().unwrap();
        let file = work.path().join("metrics.json");
        tokio::fs::write(&file, b"{}").await.unwrap();

        upload(
            local_config(),
            LocalStoreFactory::new(work.path().join("store"), "artifacts"),
            RunContext::new("run1"),
            vec![file],
            true,
        )
        .await
        .unwrap();

        let stored = work.path().join("store/artifacts/run1/metrics.json");
        assert_eq!(tokio::fs::read(stored).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn upload_reports_a_crash_on_an_existing_object() {
        let work = tempfile::TempDir::new().unwrap();
        let existing = work.path().join("store/artifacts/run1/model.pt");
        tokio::fs::create_dir_all(existing.parent().unwrap()).await.unwrap();
        tokio::fs::write(&existing, b"old").await.unwrap();
        let file = work.path().join("model.pt");
        tokio::fs::write(&file, b"new").await.unwrap();

        let err = upload(
            local_config(),
            LocalStoreFactory::new(work.path().join("store"), "artifacts"),
            RunContext::new("run1"),
            vec![file],
            false,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("already exists"), "{err}");
        assert_eq!(tokio::fs::read(existing).await.unwrap(), b"old");
    }
}
