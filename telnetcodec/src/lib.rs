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

//! # mudmux TELNET codec
//!
//! A stateful TELNET protocol engine for the mudmux proxy: byte-level
//! framing, RFC 1143 option negotiation, and RFC 2066 charset switching,
//! built for asynchronous I/O on Tokio.
//!
//! ## Overview
//!
//! TELNET (RFC 854) interleaves a data stream with command sequences
//! introduced by the IAC byte (0xFF). This crate decomposes the protocol
//! into the pieces a proxy needs:
//!
//! - [`TelnetCodec`] — an incremental decoder/encoder pair implementing
//!   `tokio_util::codec::{Decoder, Encoder}`. The decoder strips IAC
//!   framing, canonicalizes the RFC 854 carriage-return rules, and
//!   surfaces negotiation commands and subnegotiation blocks as
//!   [`TelnetEvent`]s. The encoder applies the inverse escaping.
//! - [`OptionTable`] — per-option-code Q-method state machines
//!   (RFC 1143), tracking our side and the peer's side independently so
//!   negotiation can never loop and never has more than one outstanding
//!   request per side.
//! - [`CharsetDriver`] — the RFC 2066 CHARSET subnegotiation handler,
//!   which switches the stream [`Encoding`] mid-flight without losing or
//!   double-encoding a single byte, and drags TRANSMIT-BINARY along to
//!   match the selected charset.
//! - [`TelnetConn`] — the composition of the above over any
//!   `AsyncRead + AsyncWrite` stream, splittable into a [`ConnReader`]
//!   and a cloneable [`ConnWriter`].
//!
//! ## Example
//!
//! ```no_run
//! use mudmux_telnetcodec::TelnetConn;
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> std::io::Result<()> {
//! let stream = TcpStream::connect("mud.example.com:4000").await?;
//! let mut conn = TelnetConn::client(stream);
//! conn.negotiate_options().await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = conn.read(&mut buf).await?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//! conn.write(b"look\n").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Malformed wire input — unknown commands, bad subnegotiations, stray
//! CRs — is logged at debug level and recovered locally; it never fails a
//! read. Un-representable bytes substitute SUB (0x1A) rather than failing
//! a write. Only genuine I/O errors propagate.
//!
//! ## Related RFCs
//!
//! - RFC 854: Telnet Protocol Specification
//! - RFC 855: Telnet Option Specifications
//! - RFC 856: Telnet Binary Transmission
//! - RFC 858: Telnet Suppress Go Ahead Option
//! - RFC 885: Telnet End of Record Option
//! - RFC 1143: The Q Method of Implementing TELNET Option Negotiation
//! - RFC 2066: TELNET CHARSET Option

#![warn(missing_docs, rust_2018_idioms, future_incompatible)]

pub mod consts;

mod charset;
mod codec;
mod connection;
mod encoding;
mod event;
mod option;
mod result;

pub use self::charset::{CharsetDriver, OptionHandler};
pub use self::codec::TelnetCodec;
pub use self::connection::{ConnReader, ConnWriter, Role, TelnetConn};
pub use self::encoding::Encoding;
pub use self::event::{TelnetEvent, TelnetFrame};
pub use self::option::{OptionChange, OptionTable, QState, Side};
pub use self::result::{CodecError, CodecResult};
