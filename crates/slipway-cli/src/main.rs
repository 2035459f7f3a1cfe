mod commands;

use clap::{Parser, Subcommand};
use slipway_build::CancelFlag;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "slipway",
    about = "Package serverless services and skip unchanged deployments"
)]
#[command(version)]
struct Cli {
    /// Service directory containing slipway.toml
    #[arg(long, short = 'd', global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build deployment artifacts
    Package {
        /// Only build the artifact containing this function
        #[arg(long, short = 'f')]
        function: Option<String>,
    },
    /// Print the files a unit's artifact would contain
    Files {
        /// Resolve the unit containing this function
        #[arg(long, short = 'f', conflicts_with = "layer")]
        function: Option<String>,
        /// Resolve this layer
        #[arg(long, short = 'l')]
        layer: Option<String>,
    },
    /// Compare local artifacts with the latest remote deployment
    Check {
        /// Compiled deployment template (default: .slipway/compiled-template.json)
        #[arg(long, short = 't')]
        template: Option<PathBuf>,
        /// Always report that a deployment is needed
        #[arg(long)]
        force: bool,
    },
    /// Install python requirements through the dependency cache
    Deps {
        /// Requirements manifest (default: requirements.txt)
        #[arg(long, short = 'r')]
        requirements: Option<PathBuf>,
    },
    /// Manage the dependency cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached dependency trees
    List,
    /// Delete every cached dependency tree
    Clean,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        commands::report_error(&err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let dir = cli.dir;
    match cli.command {
        Commands::Package { function } => {
            let cancel = cancel_on_ctrl_c();
            commands::package(&dir, function.as_deref(), cancel).await?
        }
        Commands::Files { function, layer } => {
            commands::files(&dir, function.as_deref(), layer.as_deref()).await?
        }
        Commands::Check { template, force } => {
            commands::check(&dir, template.as_deref(), force).await?
        }
        Commands::Deps { requirements } => commands::deps(&dir, requirements.as_deref()).await?,
        Commands::Cache { action } => match action {
            CacheAction::List => commands::cache_list(&dir)?,
            CacheAction::Clean => commands::cache_clean(&dir)?,
        },
    }
    Ok(())
}

/// First Ctrl-C stops packaging between archive entries; partial archives
/// are removed by the builder.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupt received; cancelling packaging");
                flag.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "cannot listen for Ctrl-C"),
        }
    });
    cancel
}
