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

//! # mudmux server
//!
//! A password-gated multiplexing TELNET proxy. One persistent upstream
//! connection per configured world is shared among any number of
//! transient downstream clients: new joiners get the recent scrollback
//! replayed, everyone sees the same upstream output, and everything the
//! world sends is written to a durable session log.
//!
//! The interesting machinery:
//!
//! - [`proxy`] — one coordinator task per world owning all mutable
//!   session state, driven entirely through typed channels.
//! - [`registry`] — the concurrent name → proxy map, creating proxies on
//!   demand and letting them remove themselves on exit.
//! - [`history`] — the bounded scrollback replayed to joining clients.
//! - [`session`] — the `connect <name> <password>` handshake.
//!
//! Protocol-level concerns (TELNET framing, option negotiation, CHARSET)
//! live in the `mudmux-telnetcodec` crate.

pub mod config;
pub mod error;
pub mod history;
pub mod logfile;
pub mod proxy;
pub mod registry;
pub mod session;

pub use config::{Config, ProxyConfig};
pub use error::{Result, ServerError};
pub use proxy::Proxy;
pub use registry::ProxyRegistry;
