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

//! RFC 2066 CHARSET negotiation.
//!
//! The driver owns no I/O. It reacts to option-state changes and CHARSET
//! subnegotiation payloads by pushing reply frames and [`Action`]s for the
//! connection to apply: switching the stream encoding, gating the write
//! path while the exchange is pending, and toggling TRANSMIT-BINARY to
//! match the selected charset.
//!
//! Client-role connections initiate the exchange
//! (`REQUEST ";UTF-8;US-ASCII"`) as soon as CHARSET is enabled on either
//! side, and refuse any REQUEST the peer sends back — RFC 2066 forbids
//! answering a REQUEST with a REQUEST, so a simultaneous exchange must be
//! negatively acknowledged. The one exception is a peer that answers with
//! `REQUEST UTF-8` (bare, no separator): a known-buggy client that means
//! ACCEPTED, and is treated as such.

use bytes::Bytes;
use tracing::debug;

use crate::connection::Role;
use crate::consts::{charset, option};
use crate::encoding::Encoding;
use crate::event::TelnetFrame;
use crate::option::{OptionTable, Side};

/// Side effects the connection applies after a driver callback.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Action {
    /// Queue outbound application bytes until the exchange finishes.
    BeginBuffering,
    /// The exchange settled. Install the encoding (when one was chosen)
    /// and flush any queued outbound bytes through it.
    Finish(Option<Encoding>),
}

/// Handler object dispatched on subnegotiations and option changes,
/// registered against a specific option code. The set is closed; anything
/// without a handler gets the log-and-drop treatment in the connection.
#[derive(Debug)]
pub enum OptionHandler {
    /// The RFC 2066 CHARSET driver.
    Charset(CharsetDriver),
}

impl OptionHandler {
    /// Option code this handler is bound to.
    pub fn code(&self) -> u8 {
        match self {
            OptionHandler::Charset(_) => option::CHARSET,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DriverState {
    /// Nothing sent yet.
    Idle,
    /// Our REQUEST is on the wire, awaiting the peer's verdict.
    Pending,
    /// A verdict arrived (or negotiation failed outright).
    Done,
}

/// RFC 2066 charset negotiation state machine.
#[derive(Debug)]
pub struct CharsetDriver {
    state: DriverState,
}

impl Default for CharsetDriver {
    fn default() -> Self {
        CharsetDriver::new()
    }
}

impl CharsetDriver {
    /// Creates an idle driver.
    pub fn new() -> CharsetDriver {
        CharsetDriver {
            state: DriverState::Idle,
        }
    }

    /// Reacts to a resolved CHARSET option negotiation.
    pub(crate) fn on_option_change(
        &mut self,
        role: Role,
        options: &mut OptionTable,
        out: &mut Vec<TelnetFrame>,
        actions: &mut Vec<Action>,
    ) {
        let enabled = options.enabled(option::CHARSET, Side::Local)
            || options.enabled(option::CHARSET, Side::Remote);
        if enabled {
            if role == Role::Client && self.state == DriverState::Idle {
                debug!("SENT IAC SB CHARSET REQUEST \";UTF-8;US-ASCII\" IAC SE");
                self.state = DriverState::Pending;
                actions.push(Action::BeginBuffering);
                let mut payload = vec![charset::REQUEST];
                payload.extend_from_slice(b";UTF-8;US-ASCII");
                out.push(TelnetFrame::Subnegotiation(
                    option::CHARSET,
                    Bytes::from(payload),
                ));
            }
        } else if !options.negotiating(option::CHARSET, Side::Local)
            && !options.negotiating(option::CHARSET, Side::Remote)
        {
            // The peer refused the option outright; release the gate.
            self.finish(None, options, out, actions);
        }
    }

    /// Handles a complete CHARSET subnegotiation payload.
    pub(crate) fn on_subnegotiation(
        &mut self,
        payload: &[u8],
        role: Role,
        options: &mut OptionTable,
        out: &mut Vec<TelnetFrame>,
        actions: &mut Vec<Action>,
    ) {
        let Some((&cmd, body)) = payload.split_first() else {
            debug!("RECV IAC SB CHARSET IAC SE");
            return;
        };
        debug!(
            "RECV IAC SB CHARSET {} {:?} IAC SE",
            subcommand_name(cmd),
            String::from_utf8_lossy(body)
        );
        match cmd {
            charset::REQUEST => self.handle_request(body, role, options, out, actions),
            charset::ACCEPTED => {
                if let Some((_, enc)) = select_encoding(std::iter::once(body)) {
                    self.finish(Some(enc), options, out, actions);
                }
            }
            charset::REJECTED => self.finish(None, options, out, actions),
            charset::TTABLE_IS
            | charset::TTABLE_REJECTED
            | charset::TTABLE_ACK
            | charset::TTABLE_NAK => {
                // Translation tables are not supported; RFC 2066 lets us
                // ignore them.
            }
            other => debug!(subcommand = other, "unknown CHARSET subcommand"),
        }
    }

    fn handle_request(
        &mut self,
        body: &[u8],
        role: Role,
        options: &mut OptionTable,
        out: &mut Vec<TelnetFrame>,
        actions: &mut Vec<Action>,
    ) {
        if role == Role::Client {
            // We sent the REQUEST on this connection. A REQUEST in reply
            // is either the buggy ACCEPT spelling or a simultaneous
            // exchange we must refuse.
            if body == b"UTF-8" {
                self.finish(Some(Encoding::Utf8), options, out, actions);
            } else {
                send_rejected(out);
            }
            return;
        }

        if !options.enabled(option::CHARSET, Side::Local)
            && !options.enabled(option::CHARSET, Side::Remote)
        {
            send_rejected(out);
            return;
        }

        let mut body = body;
        const TTABLE: &[u8] = b"[TTABLE]";
        if body.len() > 10 && body.starts_with(TTABLE) {
            // Skip the tag plus its version byte.
            body = &body[TTABLE.len() + 1..];
        }
        if body.len() < 2 {
            send_rejected(out);
            return;
        }

        let sep = body[0];
        match select_encoding(body[1..].split(|&b| b == sep)) {
            None => send_rejected(out),
            Some((name, enc)) => {
                debug!(
                    "SENT IAC SB CHARSET ACCEPTED {:?} IAC SE",
                    String::from_utf8_lossy(name)
                );
                let mut payload = vec![charset::ACCEPTED];
                payload.extend_from_slice(name);
                out.push(TelnetFrame::Subnegotiation(
                    option::CHARSET,
                    Bytes::from(payload),
                ));
                self.finish(Some(enc), options, out, actions);
            }
        }
    }

    fn finish(
        &mut self,
        enc: Option<Encoding>,
        options: &mut OptionTable,
        out: &mut Vec<TelnetFrame>,
        actions: &mut Vec<Action>,
    ) {
        if let Some(enc) = enc {
            if enc.is_binary() {
                options.ask_enable(option::BINARY, Side::Local, out);
                options.ask_enable(option::BINARY, Side::Remote, out);
            } else {
                options.ask_disable(option::BINARY, Side::Local, out);
                options.ask_disable(option::BINARY, Side::Remote, out);
            }
        }
        self.state = DriverState::Done;
        actions.push(Action::Finish(enc));
    }
}

fn send_rejected(out: &mut Vec<TelnetFrame>) {
    debug!("SENT IAC SB CHARSET REJECTED IAC SE");
    out.push(TelnetFrame::Subnegotiation(
        option::CHARSET,
        Bytes::from_static(&[charset::REJECTED]),
    ));
}

/// Picks the best supported charset from a list of names: UTF-8 wins,
/// US-ASCII is the fallback.
fn select_encoding<'a, I>(names: I) -> Option<(&'a [u8], Encoding)>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut fallback = None;
    for name in names {
        match name {
            b"UTF-8" => return Some((name, Encoding::Utf8)),
            b"US-ASCII" => fallback = Some((name, Encoding::Ascii)),
            _ => {}
        }
    }
    fallback
}

fn subcommand_name(byte: u8) -> &'static str {
    match byte {
        charset::REQUEST => "REQUEST",
        charset::ACCEPTED => "ACCEPTED",
        charset::REJECTED => "REJECTED",
        charset::TTABLE_IS => "TTABLE-IS",
        charset::TTABLE_REJECTED => "TTABLE-REJECTED",
        charset::TTABLE_ACK => "TTABLE-ACK",
        charset::TTABLE_NAK => "TTABLE-NAK",
        _ => "?",
    }
}
