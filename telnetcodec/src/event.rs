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

//! Frame and event types passed between the codec and the connection.

use bytes::Bytes;

use crate::consts;

/// One decoded unit produced by [`TelnetCodec::decode`](crate::TelnetCodec).
///
/// `Data` bytes are already IAC-unescaped and CR-canonicalized (`CR LF`
/// arrives as `\n`, `CR NUL` as `\r`) but not yet character-decoded; the
/// connection layer applies the active [`Encoding`](crate::Encoding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetEvent {
    /// A single data byte.
    Data(u8),
    /// A two-byte command (`IAC <cmd>`) other than negotiation: NOP, GA,
    /// EOR, AYT and the rest. Logged and discarded upstream.
    Command(u8),
    /// A negotiation command: `(DO | DONT | WILL | WONT, option)`.
    Negotiate(u8, u8),
    /// A complete subnegotiation block: `(option, de-escaped payload)`.
    Subnegotiation(u8, Bytes),
}

/// One unit accepted by [`TelnetCodec::encode`](crate::TelnetCodec).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetFrame {
    /// Application bytes. The encoder escapes IAC and expands `\n` to
    /// `CR LF` and `\r` to `CR NUL`.
    Data(Bytes),
    /// A two-byte command (`IAC <cmd>`).
    Command(u8),
    /// A negotiation command: `(DO | DONT | WILL | WONT, option)`.
    Negotiate(u8, u8),
    /// A subnegotiation block: `(option, raw payload)`. IAC bytes in the
    /// payload are escaped on encode.
    Subnegotiation(u8, Bytes),
}

impl std::fmt::Display for TelnetFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetFrame::Data(bytes) => write!(f, "DATA[{}]", bytes.len()),
            TelnetFrame::Command(cmd) => write!(f, "IAC {}", consts::command_name(*cmd)),
            TelnetFrame::Negotiate(cmd, opt) => write!(
                f,
                "IAC {} {}",
                consts::command_name(*cmd),
                consts::option_name(*opt)
            ),
            TelnetFrame::Subnegotiation(opt, payload) => write!(
                f,
                "IAC SB {} [{}] IAC SE",
                consts::option_name(*opt),
                payload.len()
            ),
        }
    }
}
