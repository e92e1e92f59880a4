//! jewel - assembles a signed APT repository from CI build artifacts.

mod error;

use crate::error::{ErrorKind, Result};
use clap::{Args, Parser, Subcommand};
use exn::ResultExt;
use jewel_artifact::{ArtifactoryConfig, ArtifactoryProvider};
use jewel_config::{Config, Overrides, scan_source_dir};
use jewel_repo::{Assembler, Settings};
use jewel_sign::SystemToolchain;
use jewel_storage::backend::LocalBackend;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jewel", version, about = "Assembles signed APT repositories from remote build artifacts")]
struct Cli {
    /// Configuration file (default: the platform config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// More output; repeat for more (overridden by RUST_LOG)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the repository tree into a directory
    Plan {
        /// Where `dists/`, `pool/` and `keys/` are written
        repo_out: PathBuf,
        /// `{distribution}/{component}/{version}.txt` tree holding build
        /// numbers; the configured repository is used without it
        source_dir: Option<PathBuf>,
        /// Package extractions in flight at once
        #[arg(long)]
        concurrency: Option<usize>,
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[derive(Debug, Args)]
struct RemoteArgs {
    #[arg(long, env = "ARTIFACTORY_HOST")]
    artifactory_host: Option<String>,
    #[arg(long, env = "ARTIFACTORY_USER")]
    artifactory_user: Option<String>,
    #[arg(long, env = "ARTIFACTORY_API_KEY", hide_env_values = true)]
    artifactory_api_key: Option<String>,
    #[arg(long, env = "ARTIFACTORY_PROJECT_KEY")]
    artifactory_project: Option<String>,
    #[arg(long, env = "ARTIFACTORY_REPOSITORY")]
    artifactory_repository: Option<String>,
    /// Signing key; gpg's default key without it
    #[arg(long, env = "GPG_KEY_NAME")]
    gpg_key_name: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(env_filter(cli.verbose)).with_writer(std::io::stderr).init();

    match cli.command {
        Command::Plan { ref repo_out, ref source_dir, concurrency, ref remote } => {
            match plan(cli.config.as_deref(), repo_out, source_dir.as_deref(), overrides(remote, concurrency)).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("{err:?}");
                    ExitCode::FAILURE
                },
            }
        },
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises jewel's level from `info`.
fn env_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("warn,jewel={level},jewel_repo={level},jewel_artifact={level},jewel_sign={level}"))
    })
}

fn overrides(remote: &RemoteArgs, concurrency: Option<usize>) -> Overrides {
    Overrides {
        artifactory_host: remote.artifactory_host.clone(),
        artifactory_user: remote.artifactory_user.clone(),
        artifactory_api_key: remote.artifactory_api_key.clone(),
        artifactory_project: remote.artifactory_project.clone(),
        artifactory_repository: remote.artifactory_repository.clone(),
        gpg_key_name: remote.gpg_key_name.clone(),
        concurrency,
    }
}

async fn plan(
    config: Option<&Path>,
    repo_out: &Path,
    source_dir: Option<&Path>,
    overrides: Overrides,
) -> Result<()> {
    let config = Config::load(config, &overrides).or_raise(|| ErrorKind::Config)?;
    let source = match source_dir {
        Some(dir) => scan_source_dir(dir).or_raise(|| ErrorKind::Config)?,
        None => config.deb.repo.clone(),
    };

    let artifactory = &config.artifactory;
    let provider = ArtifactoryProvider::new(
        "artifactory",
        ArtifactoryConfig {
            host: artifactory.host.clone().unwrap_or_default(),
            user: artifactory.user.clone().unwrap_or_default(),
            api_key: artifactory.api_key.clone().unwrap_or_default(),
            project: artifactory.project.clone().unwrap_or_default(),
            repository: artifactory.repository.clone().unwrap_or_default(),
            runner_tag: artifactory.runner_tag.clone(),
            timeout: artifactory.timeout(),
        },
    )
    .or_raise(|| ErrorKind::Provider)?;
    provider.init().await.or_raise(|| ErrorKind::Provider)?;

    let root = std::path::absolute(repo_out).or_raise(|| ErrorKind::Storage)?;
    let storage = LocalBackend::new("repo", &root).or_raise(|| ErrorKind::Storage)?;
    let toolchain = SystemToolchain::discover(config.gpg.key_name.clone()).or_raise(|| ErrorKind::Toolchain)?;

    let settings = Settings::from_config(&config).or_raise(|| ErrorKind::Config)?;
    let assembler = Assembler::new(Arc::new(provider), Arc::new(storage), Arc::new(toolchain), settings)
        .or_raise(|| ErrorKind::Assembly)?;
    let repo = assembler.resolve(&source).await.or_raise(|| ErrorKind::Assembly)?;
    let report = assembler.plan(&repo).await.or_raise(|| ErrorKind::Assembly)?;
    tracing::info!(
        out = %root.display(),
        packages = report.packages,
        groups = report.architectures.len(),
        "Repository written"
    );
    Ok(())
}
