use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use libcourier::client::ClientFactory;
use libcourier::loopback::{LoopbackConfig, LoopbackFactory};

use courier_web::config::ServerConfig;
use courier_web::server;

#[derive(Parser, Debug)]
#[command(name = "courier-web", about = "Messaging-session manager HTTP surface")]
struct Args {
    /// Path to a TOML config file (default: XDG config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:8750.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Allowed CORS origin; repeatable, "*" allows any.
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Directory for per-tenant pairing credentials.
    #[arg(long)]
    credential_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_web=info,libcourier=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::load()?,
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if !args.allow_origins.is_empty() {
        config.allow_origins = args.allow_origins.clone();
    }
    if let Some(dir) = args.credential_dir {
        config.credential_dir = dir;
    }

    // The built-in transport; a real protocol client plugs in behind the same
    // factory trait.
    let factory: Arc<dyn ClientFactory> = Arc::new(LoopbackFactory::new(
        LoopbackConfig::default().with_credential_dir(&config.credential_dir),
    ));

    server::serve(config, factory).await
}

fn load_config(path: &Path) -> Result<ServerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))
}
