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

//! Process-wide proxy registry.
//!
//! A concurrent map of live proxies keyed by case-folded name. Proxies
//! are created on demand from configuration when a session first asks
//! for them; each proxy removes its own entry as the last act of its
//! coordinator loop. The registry is an explicitly-constructed value
//! shared by `Arc`, not ambient state.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::proxy::{Proxy, ProxyLoop};

/// Registry of live proxies plus the configuration they spawn from.
pub struct ProxyRegistry {
    config: Config,
    proxies: DashMap<String, Proxy>,
}

impl ProxyRegistry {
    /// Creates a registry for the given configuration.
    pub fn new(config: Config) -> Arc<ProxyRegistry> {
        Arc::new(ProxyRegistry {
            config,
            proxies: DashMap::new(),
        })
    }

    /// The configuration the registry was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the live proxy for `name`, spawning its coordinator from
    /// configuration if this is the first reference. `None` if the name
    /// is not configured.
    pub fn find(self: &Arc<Self>, name: &str) -> Option<Proxy> {
        let key = name.to_lowercase();
        if let Some(existing) = self.proxies.get(&key) {
            return Some(existing.value().clone());
        }
        let cfg = self.config.proxies.get(&key)?.clone();

        let entry = self.proxies.entry(key.clone()).or_insert_with(|| {
            let (proxy, looper) = ProxyLoop::new(key.clone(), cfg);
            let registry = Arc::clone(self);
            let handle = proxy.clone();
            tokio::spawn(async move {
                let name = handle.name().to_string();
                looper.run(handle).await;
                registry.proxies.remove(&name);
                debug!(proxy = %name, "registry entry removed");
            });
            proxy
        });
        Some(entry.value().clone())
    }

    /// Number of live proxies.
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Whether no proxies are live.
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Closes every live proxy, as on shutdown.
    pub async fn close_all(&self) {
        let snapshot: Vec<Proxy> = self.proxies.iter().map(|e| e.value().clone()).collect();
        for proxy in snapshot {
            info!(proxy = %proxy.name(), "closing proxy");
            if let Err(e) = proxy.close().await {
                warn!(proxy = %proxy.name(), error = %e, "close failed");
            }
        }
    }

    /// Asks every live proxy to rotate its log file, as on SIGHUP.
    pub async fn reopen_logs(&self) {
        let snapshot: Vec<Proxy> = self.proxies.iter().map(|e| e.value().clone()).collect();
        for proxy in snapshot {
            info!(proxy = %proxy.name(), "reopening log");
            if let Err(e) = proxy.reopen_log().await {
                warn!(proxy = %proxy.name(), error = %e, "log reopen failed");
            }
        }
    }
}
