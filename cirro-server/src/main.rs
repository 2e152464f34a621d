use cirro_server::config::{EdgeConfig, OriginConfig};
use cirro_server::server::{run_edge_server, run_origin_server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "cirro")]
#[command(about = "Distributed static file serving with an origin node and caching edge nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the authoritative origin node
    Origin {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Override the listen address
        #[arg(long)]
        listen_addr: Option<String>,

        /// Override the directory to serve
        #[arg(long)]
        serve_dir: Option<PathBuf>,

        /// Comma separated list of file suffixes the origin serves itself
        /// instead of redirecting to an edge node
        #[arg(long)]
        self_serve: Option<String>,
    },
    /// Start a caching edge node
    Edge {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Override the listen address
        #[arg(long)]
        listen_addr: Option<String>,

        /// Override the address clients can reach this edge node at
        #[arg(long)]
        advertise_addr: Option<String>,

        /// Override the base address of the origin node to mirror
        #[arg(long)]
        origin_addr: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cirro=info,cirro_core=info,cirro_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Origin {
            config,
            listen_addr,
            serve_dir,
            self_serve,
        } => {
            let mut cfg = match OriginConfig::load(config.as_deref()) {
                Ok(cfg) => cfg,
                Err(error) => {
                    tracing::error!("Failed to load config: {}", error);
                    std::process::exit(1);
                }
            };
            if let Some(listen_addr) = listen_addr {
                cfg.listen_addr = listen_addr;
            }
            if let Some(serve_dir) = serve_dir {
                cfg.serve_dir = serve_dir;
            }
            if let Some(self_serve) = self_serve {
                cfg.self_served = self_serve
                    .split(',')
                    .filter(|suffix| !suffix.is_empty())
                    .map(|suffix| suffix.to_string())
                    .collect();
            }

            if let Err(error) = run_origin_server(cfg).await {
                tracing::error!("Server error: {}", error);
                std::process::exit(1);
            }
        }
        Commands::Edge {
            config,
            listen_addr,
            advertise_addr,
            origin_addr,
        } => {
            let mut cfg = match EdgeConfig::load(config.as_deref()) {
                Ok(cfg) => cfg,
                Err(error) => {
                    tracing::error!("Failed to load config: {}", error);
                    std::process::exit(1);
                }
            };
            if let Some(listen_addr) = listen_addr {
                cfg.listen_addr = listen_addr;
            }
            if let Some(advertise_addr) = advertise_addr {
                cfg.advertise_addr = advertise_addr;
            }
            if let Some(origin_addr) = origin_addr {
                cfg.origin_addr = origin_addr;
            }

            if let Err(error) = run_edge_server(cfg).await {
                tracing::error!("Server error: {}", error);
                std::process::exit(1);
            }
        }
    }
}
