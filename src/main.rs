use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kiln::config::KilnConfig;
use kiln::logging::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(version, about = "Build, watch and deploy from the command line")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Backend base URL. Overrides KILN_API_URL and kiln.toml.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Bearer credential for the backend. Overrides KILN_TOKEN.
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Repository as owner/name. Overrides [repo] in kiln.toml.
    #[arg(long, global = true)]
    pub repo: Option<String>,

    /// Branch to build from. Overrides [repo] branch.
    #[arg(long, global = true)]
    pub branch: Option<String>,

    /// Diagnostic log format: pretty or json
    #[arg(long, default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List recent commits on the configured branch
    Commits,
    /// Start a build for a commit (newest commit by default)
    Build {
        /// Commit hash or unique prefix
        commit: Option<String>,
        /// Stream the build's logs until it finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// List builds for the repository
    Builds,
    /// Show a build's logs: live if it is still running, persisted otherwise
    Logs { build_id: String },
    /// Reconcile and show a build's status
    Status { build_id: String },
    /// Deploy a succeeded build
    Deploy {
        build_id: String,
        /// Expose the deployment through an ingress
        #[arg(long)]
        ingress: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default kiln.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&project_dir, command.clone());
    }

    let config = KilnConfig::with_cli_args(
        &project_dir,
        cli.api_url.clone(),
        cli.token.clone(),
        cli.verbose,
    )?;

    match &cli.command {
        Commands::Commits => cmd::cmd_commits(&cli, &config).await?,
        Commands::Build { commit, follow } => {
            cmd::cmd_build(&cli, &config, commit.as_deref(), *follow).await?
        }
        Commands::Builds => cmd::cmd_builds(&cli, &config).await?,
        Commands::Logs { build_id } => cmd::cmd_logs(&cli, &config, build_id).await?,
        Commands::Status { build_id } => cmd::cmd_status(&cli, &config, build_id).await?,
        Commands::Deploy { build_id, ingress } => {
            cmd::cmd_deploy(&cli, &config, build_id, *ingress).await?
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
