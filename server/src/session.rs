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

//! Downstream client sessions: banner, auth handshake, mount.

use std::sync::Arc;

use mudmux_telnetcodec::TelnetConn;
use tracing::{debug, info, warn};

use crate::registry::ProxyRegistry;

/// Auth-handshake lines longer than this are rejected outright.
const MAX_LINE: usize = 512;

const MOTD: &str = "
Welcome to mudmux
------------------------------------------------------------------------
  \"connect <name> <password>\" connects you to an existing world.
------------------------------------------------------------------------
";

const AUTH_FAILED: &str = "invalid proxy name or password";

/// Runs one downstream session from greeting to mount. Returns when the
/// client is mounted (its I/O then belongs to the proxy) or rejected.
pub async fn run_session(mut conn: TelnetConn, peer: String, registry: Arc<ProxyRegistry>) {
    if let Err(e) = conn.negotiate_options().await {
        debug!(%peer, error = %e, "negotiation write failed");
        return;
    }
    if conn.write(MOTD.as_bytes()).await.is_err() {
        return;
    }

    let line = match conn.read_line(MAX_LINE).await {
        Ok(Some(line)) => line,
        Ok(None) => return,
        Err(e) => {
            debug!(%peer, error = %e, "handshake read failed");
            return;
        }
    };

    // The handshake line is exactly `connect <name> <password>`. The
    // rejection line never says which part was wrong.
    let words: Vec<&str> = line.split(' ').collect();
    let (name, password) = match words.as_slice() {
        ["connect", name, password] => (name.to_lowercase(), *password),
        _ => {
            debug!(%peer, "malformed handshake line");
            let _ = conn.close().await;
            return;
        }
    };

    let authorized = registry
        .config()
        .proxy(&name)
        .map(|p| p.expected_password(&registry.config().password) == password)
        .unwrap_or(false);
    if !authorized {
        info!(%peer, proxy = %name, "authentication failed");
        let _ = conn.writer().write_line(AUTH_FAILED).await;
        let _ = conn.close().await;
        return;
    }

    let Some(proxy) = registry.find(&name) else {
        // Configured a moment ago, gone now; nothing better to say.
        let _ = conn.writer().write_line(AUTH_FAILED).await;
        let _ = conn.close().await;
        return;
    };

    let (reader, writer) = conn.split();
    match proxy.add_client(reader, writer.clone(), peer.clone()).await {
        Ok(()) => {
            info!(%peer, proxy = %name, "session mounted");
        }
        Err(e) => {
            let message = format!("error connecting to world '{name}': {e}");
            warn!(%peer, proxy = %name, "{message}");
            let _ = writer.write_line(&message).await;
            let _ = writer.close().await;
        }
    }
}
