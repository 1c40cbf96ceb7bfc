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

//! Server configuration.
//!
//! Loaded from a YAML file, e.g.:
//!
//! ```yaml
//! listen: "0.0.0.0:4001"
//! password: hunter2
//! proxies:
//!   darkmoon:
//!     address: "darkmoon.example.net:4000"
//!     log: "~/logs/%Y-%m-%d-darkmoon.log"
//!     raw: true
//!     onconnect: "connect Guest guest"
//!     encoding: "UTF-8"
//! ```

use std::collections::HashMap;
use std::path::Path;

use mudmux_telnetcodec::Encoding;
use serde::Deserialize;

use crate::error::{Result, ServerError};
use crate::logfile;

fn default_listen() -> String {
    "0.0.0.0:4001".to_string()
}

/// Top-level server configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// TCP address the listener binds.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Global password for the `connect` handshake.
    #[serde(default)]
    pub password: String,
    /// Configured worlds, keyed by proxy name (case-insensitive).
    #[serde(default)]
    pub proxies: HashMap<String, ProxyConfig>,
}

/// Per-proxy configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Upstream address, host:port.
    pub address: String,
    /// Log filename template, expanded strftime-style at open time. A
    /// leading `~/` resolves to the home directory.
    #[serde(default)]
    pub log: Option<String>,
    /// Also keep a raw pre-decode byte log next to the main one.
    #[serde(default)]
    pub raw: bool,
    /// Line sent upstream right after the connection is established.
    #[serde(default)]
    pub onconnect: Option<String>,
    /// Password overriding the global one for this proxy.
    #[serde(default)]
    pub password: Option<String>,
    /// IANA charset name used as the upstream's default encoding.
    #[serde(default)]
    pub encoding: Option<String>,
}

impl Config {
    /// Reads and validates a YAML config file.
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Config::parse(&text)
    }

    /// Parses and validates YAML config text.
    pub fn parse(text: &str) -> Result<Config> {
        let mut config: Config = serde_yaml::from_str(text)
            .map_err(|e| ServerError::Config(e.to_string()))?;

        // Proxy names are case-insensitive; fold the keys once here.
        config.proxies = config
            .proxies
            .into_iter()
            .map(|(name, proxy)| (name.to_lowercase(), proxy))
            .collect();

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, proxy) in &self.proxies {
            if proxy.address.is_empty() {
                return Err(ServerError::Config(format!(
                    "proxy '{name}' has no address"
                )));
            }
            if let Some(encoding) = &proxy.encoding {
                Encoding::from_iana(encoding).map_err(|e| {
                    ServerError::Config(format!("proxy '{name}': {e}"))
                })?;
            }
            if let Some(template) = &proxy.log {
                logfile::check_template(template).map_err(|e| {
                    ServerError::Config(format!("proxy '{name}': {e}"))
                })?;
            }
        }
        Ok(())
    }

    /// Looks up a proxy's configuration by case-folded name.
    pub fn proxy(&self, name: &str) -> Option<&ProxyConfig> {
        self.proxies.get(&name.to_lowercase())
    }
}

impl ProxyConfig {
    /// The password this proxy expects: its own if set, else the global.
    pub fn expected_password<'a>(&'a self, global: &'a str) -> &'a str {
        self.password.as_deref().unwrap_or(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let config = Config::parse(
            r#"
password: secret
proxies:
  DarkMoon:
    address: "darkmoon.example.net:4000"
"#,
        )
        .unwrap();
        assert_eq!(config.listen, "0.0.0.0:4001");
        assert_eq!(config.password, "secret");
        // Keys fold to lowercase.
        assert!(config.proxy("darkmoon").is_some());
        assert!(config.proxy("DARKMOON").is_some());
        assert!(config.proxy("other").is_none());
    }

    #[test]
    fn full_proxy_entry_parses() {
        let config = Config::parse(
            r#"
listen: "127.0.0.1:7777"
password: secret
proxies:
  mud:
    address: "mud.example.com:23"
    log: "%Y-%m-%d-mud.log"
    raw: true
    onconnect: "connect Guest guest"
    password: override
    encoding: "UTF-8"
"#,
        )
        .unwrap();
        let proxy = config.proxy("mud").unwrap();
        assert_eq!(proxy.address, "mud.example.com:23");
        assert!(proxy.raw);
        assert_eq!(proxy.expected_password("secret"), "override");
    }

    #[test]
    fn global_password_is_the_fallback() {
        let proxy = ProxyConfig {
            address: "x:1".into(),
            log: None,
            raw: false,
            onconnect: None,
            password: None,
            encoding: None,
        };
        assert_eq!(proxy.expected_password("global"), "global");
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let err = Config::parse(
            r#"
password: secret
proxies:
  mud:
    address: "mud.example.com:23"
    encoding: "EBCDIC-US"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("EBCDIC-US"));
    }

    #[test]
    fn missing_address_is_rejected() {
        let err = Config::parse(
            r#"
password: secret
proxies:
  mud:
    address: ""
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no address"));
    }

    #[test]
    fn bad_log_template_is_rejected() {
        let err = Config::parse(
            r#"
password: secret
proxies:
  mud:
    address: "mud.example.com:23"
    log: "%Q-broken.log"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("template"));
    }
}
