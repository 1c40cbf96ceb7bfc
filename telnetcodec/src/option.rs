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

//! Option negotiation state, one Q-method pair per option code.
//!
//! RFC 1143 ("The Q Method of Implementing TELNET Option Negotiation")
//! replaces the naive request/acknowledge loop with six states per side,
//! guaranteeing at most one outstanding WILL/DO per option and no
//! negotiation loops. The `local` machine answers DO/DONT (whether *we*
//! perform the option), the `remote` machine answers WILL/WONT (whether
//! the peer does).
//!
//! All entry points are pure with respect to I/O: they mutate state and
//! push reply frames into a caller-supplied vector. The connection layer
//! owns the table and writes the frames out.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::debug;

use crate::consts;
use crate::event::TelnetFrame;

/// Which side of the connection an option state refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Our side: negotiated with WILL/WONT from us, DO/DONT from the peer.
    Local,
    /// The peer's side: negotiated with DO/DONT from us, WILL/WONT from
    /// the peer.
    Remote,
}

/// RFC 1143 negotiation state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QState {
    /// Disabled.
    #[default]
    No,
    /// Enabled.
    Yes,
    /// Disable requested, no queued follow-up.
    WantNoEmpty,
    /// Disable requested, enable queued behind it.
    WantNoOpposite,
    /// Enable requested, no queued follow-up.
    WantYesEmpty,
    /// Enable requested, disable queued behind it.
    WantYesOpposite,
}

impl QState {
    fn negotiating(self) -> bool {
        !matches!(self, QState::No | QState::Yes)
    }
}

/// A resolved negotiation: the option reached Yes or No on one side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionChange {
    /// Option code.
    pub code: u8,
    /// Which side settled.
    pub side: Side,
    /// `true` if the option ended up enabled.
    pub enabled: bool,
}

#[derive(Debug, Default)]
struct OptionEntry {
    allow_local: bool,
    allow_remote: bool,
    local: QState,
    remote: QState,
    local_waiters: Vec<oneshot::Sender<bool>>,
    remote_waiters: Vec<oneshot::Sender<bool>>,
}

impl OptionEntry {
    fn state(&self, side: Side) -> QState {
        match side {
            Side::Local => self.local,
            Side::Remote => self.remote,
        }
    }

    fn set_state(&mut self, side: Side, state: QState) {
        match side {
            Side::Local => self.local = state,
            Side::Remote => self.remote = state,
        }
    }

    fn allowed(&self, side: Side) -> bool {
        match side {
            Side::Local => self.allow_local,
            Side::Remote => self.allow_remote,
        }
    }

    fn settle(&mut self, side: Side) {
        let enabled = self.state(side) == QState::Yes;
        let waiters = match side {
            Side::Local => std::mem::take(&mut self.local_waiters),
            Side::Remote => std::mem::take(&mut self.remote_waiters),
        };
        for tx in waiters {
            let _ = tx.send(enabled);
        }
    }
}

/// Table of lazily-created option entries for one connection.
///
/// Entries are created on first reference and never destroyed while the
/// connection lives.
#[derive(Debug, Default)]
pub struct OptionTable {
    entries: HashMap<u8, OptionEntry>,
}

impl OptionTable {
    /// Creates an empty table.
    pub fn new() -> OptionTable {
        OptionTable::default()
    }

    fn entry(&mut self, code: u8) -> &mut OptionEntry {
        self.entries.entry(code).or_default()
    }

    /// Sets whether enable requests are honored for each side of the
    /// option. Unreferenced options refuse everything.
    pub fn allow(&mut self, code: u8, local: bool, remote: bool) {
        let entry = self.entry(code);
        entry.allow_local = local;
        entry.allow_remote = remote;
    }

    /// Whether the option has fully negotiated to enabled on `side`.
    pub fn enabled(&self, code: u8, side: Side) -> bool {
        self.entries
            .get(&code)
            .map(|e| e.state(side) == QState::Yes)
            .unwrap_or(false)
    }

    /// Whether a negotiation is in flight on `side`.
    pub fn negotiating(&self, code: u8, side: Side) -> bool {
        self.entries
            .get(&code)
            .map(|e| e.state(side).negotiating())
            .unwrap_or(false)
    }

    /// Current state, mostly for diagnostics and tests.
    pub fn state(&self, code: u8, side: Side) -> QState {
        self.entries
            .get(&code)
            .map(|e| e.state(side))
            .unwrap_or_default()
    }

    /// Returns a receiver fulfilled at the option's next terminal
    /// transition on `side` (with the resulting enabled flag). If no
    /// negotiation is in flight the receiver resolves immediately with
    /// the current state. Callers are expected to bound the wait with
    /// their own timeout.
    pub fn on_settled(&mut self, code: u8, side: Side) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let entry = self.entry(code);
        if entry.state(side).negotiating() {
            match side {
                Side::Local => entry.local_waiters.push(tx),
                Side::Remote => entry.remote_waiters.push(tx),
            }
        } else {
            let _ = tx.send(entry.state(side) == QState::Yes);
        }
        rx
    }

    /// Asks to enable the option on `side`, emitting WILL or DO when the
    /// Q-method calls for one.
    pub fn ask_enable(&mut self, code: u8, side: Side, out: &mut Vec<TelnetFrame>) {
        let cmd = match side {
            Side::Local => consts::WILL,
            Side::Remote => consts::DO,
        };
        let entry = self.entry(code);
        match entry.state(side) {
            QState::No => {
                entry.set_state(side, QState::WantYesEmpty);
                out.push(TelnetFrame::Negotiate(cmd, code));
            }
            QState::Yes | QState::WantNoOpposite | QState::WantYesEmpty => {}
            QState::WantNoEmpty => entry.set_state(side, QState::WantNoOpposite),
            QState::WantYesOpposite => entry.set_state(side, QState::WantYesEmpty),
        }
    }

    /// Asks to disable the option on `side`, emitting WONT or DONT when
    /// the Q-method calls for one.
    pub fn ask_disable(&mut self, code: u8, side: Side, out: &mut Vec<TelnetFrame>) {
        let cmd = match side {
            Side::Local => consts::WONT,
            Side::Remote => consts::DONT,
        };
        let entry = self.entry(code);
        match entry.state(side) {
            QState::Yes => {
                entry.set_state(side, QState::WantNoEmpty);
                out.push(TelnetFrame::Negotiate(cmd, code));
            }
            QState::No | QState::WantNoEmpty | QState::WantYesOpposite => {}
            QState::WantNoOpposite => entry.set_state(side, QState::WantNoEmpty),
            QState::WantYesEmpty => entry.set_state(side, QState::WantYesOpposite),
        }
    }

    /// Feeds a received DO/DONT/WILL/WONT into the table. Reply frames are
    /// pushed onto `out`; a terminal transition is reported back so the
    /// connection can notify the option's handler.
    pub fn receive(&mut self, cmd: u8, code: u8, out: &mut Vec<TelnetFrame>) -> Option<OptionChange> {
        debug!(
            "RECV IAC {} {}",
            consts::command_name(cmd),
            consts::option_name(code)
        );
        match cmd {
            consts::DO => self.receive_enable_request(code, Side::Local, out),
            consts::DONT => self.receive_disable_demand(code, Side::Local, out),
            consts::WILL => self.receive_enable_request(code, Side::Remote, out),
            consts::WONT => self.receive_disable_demand(code, Side::Remote, out),
            _ => None,
        }
    }

    fn receive_enable_request(
        &mut self,
        code: u8,
        side: Side,
        out: &mut Vec<TelnetFrame>,
    ) -> Option<OptionChange> {
        let (accept, reject) = match side {
            Side::Local => (consts::WILL, consts::WONT),
            Side::Remote => (consts::DO, consts::DONT),
        };
        let entry = self.entry(code);
        let mut settled = false;
        match entry.state(side) {
            QState::No => {
                if entry.allowed(side) {
                    entry.set_state(side, QState::Yes);
                    out.push(TelnetFrame::Negotiate(accept, code));
                } else {
                    out.push(TelnetFrame::Negotiate(reject, code));
                }
            }
            QState::Yes => {}
            QState::WantNoEmpty => {
                entry.set_state(side, QState::No);
                settled = true;
            }
            QState::WantNoOpposite => {
                entry.set_state(side, QState::Yes);
                settled = true;
            }
            QState::WantYesEmpty => {
                entry.set_state(side, QState::Yes);
                settled = true;
            }
            QState::WantYesOpposite => {
                entry.set_state(side, QState::WantNoEmpty);
                out.push(TelnetFrame::Negotiate(reject, code));
            }
        }
        if settled {
            let enabled = entry.state(side) == QState::Yes;
            entry.settle(side);
            Some(OptionChange {
                code,
                side,
                enabled,
            })
        } else {
            None
        }
    }

    fn receive_disable_demand(
        &mut self,
        code: u8,
        side: Side,
        out: &mut Vec<TelnetFrame>,
    ) -> Option<OptionChange> {
        let (accept, reject) = match side {
            Side::Local => (consts::WILL, consts::WONT),
            Side::Remote => (consts::DO, consts::DONT),
        };
        let entry = self.entry(code);
        let mut settled = false;
        match entry.state(side) {
            QState::No => {}
            QState::Yes => {
                entry.set_state(side, QState::No);
                out.push(TelnetFrame::Negotiate(reject, code));
                settled = true;
            }
            QState::WantNoEmpty => {
                entry.set_state(side, QState::No);
                settled = true;
            }
            QState::WantNoOpposite => {
                entry.set_state(side, QState::WantYesEmpty);
                out.push(TelnetFrame::Negotiate(accept, code));
            }
            QState::WantYesEmpty => {
                entry.set_state(side, QState::No);
                settled = true;
            }
            QState::WantYesOpposite => {
                entry.set_state(side, QState::No);
                settled = true;
            }
        }
        if settled {
            let enabled = entry.state(side) == QState::Yes;
            entry.settle(side);
            Some(OptionChange {
                code,
                side,
                enabled,
            })
        } else {
            None
        }
    }
}
