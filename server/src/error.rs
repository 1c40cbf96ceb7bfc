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

//! Error types for the proxy server.

use mudmux_telnetcodec::CodecError;
use thiserror::Error;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error from a socket, log file, or config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol-layer error, e.g. an unsupported charset name.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The configuration file failed to parse or validate.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The proxy's coordinator loop has exited.
    #[error("proxy is shutting down")]
    ProxyClosed,
}
