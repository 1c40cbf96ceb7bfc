//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! mudmux server binary: listener, signal handling, session spawning.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mudmux_server::{session, Config, ProxyRegistry};
use mudmux_telnetcodec::TelnetConn;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mudmux", about = "Password-gated multiplexing TELNET proxy")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "mudmux.yaml", env = "MUDMUX_CONFIG")]
    config: PathBuf,

    /// Listen address, overriding the config file.
    #[arg(short, long, env = "MUDMUX_LISTEN")]
    listen: Option<String>,

    /// Global password, overriding the config file.
    #[arg(short, long, env = "MUDMUX_PASSWORD")]
    password: Option<String>,

    /// Log filter, e.g. `info` or `mudmux_telnetcodec=debug`.
    #[arg(long, default_value = "info", env = "MUDMUX_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), "{e}");
            std::process::exit(1);
        }
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if config.password.is_empty() {
        error!("no password configured; set `password` or MUDMUX_PASSWORD");
        std::process::exit(1);
    }

    let listener = match TcpListener::bind(&config.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %config.listen, error = %e, "cannot bind listener");
            std::process::exit(1);
        }
    };
    info!(
        pid = std::process::id(),
        address = %config.listen,
        proxies = config.proxies.len(),
        "mudmux listening"
    );

    let registry = ProxyRegistry::new(config);

    let mut sighup = signal(SignalKind::hangup()).expect("install SIGHUP handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        info!(%peer, "client connected");
                        let conn = TelnetConn::server(stream);
                        session::run_session(conn, peer.to_string(), registry).await;
                        info!(%peer, "session handler finished");
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = sighup.recv() => {
                info!("SIGHUP: reopening log files");
                registry.reopen_logs().await;
            }
            _ = sigint.recv() => {
                info!("SIGINT: closing all proxies");
                registry.close_all().await;
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM: closing all proxies");
                registry.close_all().await;
                break;
            }
        }
    }
}
