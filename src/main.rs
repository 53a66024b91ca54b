//! Demo application.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ http::dispatcher ──▶ routing ──▶ handler
//!                                          │      ▲
//!                                          ▼      │
//!                                        session store
//!                                   (memory/cookie/file/null)
//! ```
//!
//! Serves two routes:
//! - `/` counts visits in the session
//! - `/hello/([a-z]+)` greets the captured name

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use micro_web::config::{load_config, AppConfig};
use micro_web::lifecycle::{spawn_signal_listener, Shutdown};
use micro_web::observability::{logging, metrics};
use micro_web::{Context, HttpServer, RouteTable};

#[derive(Debug, Parser)]
#[command(name = "micro-web", version, about = "Minimal web framework demo server")]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn visit_counter(ctx: &mut Context) -> String {
    let visits = ctx.session().get::<u64>("visits").unwrap_or(0) + 1;
    ctx.session_mut().insert("visits", visits);
    format!("<p>You have visited this page {} time(s).</p>", visits)
}

fn hello(name: String) -> String {
    format!("Hi {}", name)
}

fn routes() -> RouteTable {
    let mut routes = RouteTable::new();
    routes.get("/", visit_counter).get("/hello/([a-z]+)", hello);
    routes
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("micro-web v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        session_store = ?config.session.store,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(&config, routes());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
