//! HTTP entry point for the dynamic-table engine.
//!
//! # Responsibility
//! - Parse flags, load configuration and initialize logging.
//! - Accept HTTP/1.1 connections and hand each request to `RequestRouter`.

mod config;
mod http;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{self, Parser};
use dyntable_core::RequestRouter;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{info, warn};
use tokio::net::TcpListener;

use crate::config::{Overrides, ServerConfig};

#[derive(clap::Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database file holding the dynamic tables
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, 0 lets the OS pick one
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "DYNTABLE_LOG")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logs go to stderr when unset
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            database: self.db.clone(),
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let config = ServerConfig::load(args.config.as_deref(), args.overrides())?;

    match &config.log_dir {
        Some(dir) => {
            let dir = dir
                .to_str()
                .context("log directory path must be valid UTF-8")?;
            dyntable_core::init_logging(&config.log_level, dir).map_err(anyhow::Error::msg)?
        }
        None => dyntable_core::init_console_logging(&config.log_level)
            .map_err(anyhow::Error::msg)?,
    }

    let Some(database) = config.database.clone() else {
        bail!("no database configured; pass --db or set `database` in the config file");
    };
    if !database.is_file() {
        bail!("database file `{}` does not exist", database.display());
    }

    let router = RequestRouter::new(config.engine.clone(), database);
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    let local_addr = listener.local_addr()?;
    info!(
        "event=server_start module=server status=ok addr={} db={} route_prefix={} version={}",
        local_addr,
        router.db_path().display(),
        router.config().normalized_route_prefix(),
        dyntable_core::core_version()
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!("event=server_accept module=server status=error error={}", err);
                        continue;
                    }
                };
                let router = router.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| http::handle(router.clone(), req));
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        warn!(
                            "event=server_connection module=server status=error peer={} error={}",
                            peer, err
                        );
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("event=server_stop module=server status=ok reason=interrupt");
                break;
            }
        }
    }

    Ok(())
}
