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

//! Protocol constants from RFC 854/855 and friends.

/// End of Record command (RFC 885).
pub const EOR: u8 = 239;
/// Subnegotiation End.
pub const SE: u8 = 240;
/// No Operation.
pub const NOP: u8 = 241;
/// Data Mark.
pub const DM: u8 = 242;
/// Break.
pub const BRK: u8 = 243;
/// Interrupt Process.
pub const IP: u8 = 244;
/// Abort Output.
pub const AO: u8 = 245;
/// Are You There.
pub const AYT: u8 = 246;
/// Erase Character.
pub const EC: u8 = 247;
/// Erase Line.
pub const EL: u8 = 248;
/// Go Ahead.
pub const GA: u8 = 249;
/// Subnegotiation Begin.
pub const SB: u8 = 250;
/// Option negotiation: sender wants to enable an option on its side.
pub const WILL: u8 = 251;
/// Option negotiation: sender refuses to enable an option on its side.
pub const WONT: u8 = 252;
/// Option negotiation: sender asks the receiver to enable an option.
pub const DO: u8 = 253;
/// Option negotiation: sender demands the receiver disable an option.
pub const DONT: u8 = 254;
/// Interpret As Command.
pub const IAC: u8 = 255;

/// Carriage return.
pub const CR: u8 = b'\r';
/// Line feed.
pub const LF: u8 = b'\n';
/// NUL, the mandatory follower of a bare CR on the wire.
pub const NUL: u8 = 0;
/// Substitute character emitted for bytes the active encoding cannot
/// represent.
pub const SUB: u8 = 0x1A;

/// Option codes negotiated by this crate.
pub mod option {
    /// Binary Transmission (RFC 856).
    pub const BINARY: u8 = 0;
    /// Echo (RFC 857).
    pub const ECHO: u8 = 1;
    /// Suppress Go Ahead (RFC 858).
    pub const SGA: u8 = 3;
    /// End of Record (RFC 885).
    pub const EOR: u8 = 25;
    /// Charset (RFC 2066).
    pub const CHARSET: u8 = 42;
}

/// CHARSET subnegotiation subcommands (RFC 2066 §3).
pub mod charset {
    /// REQUEST: sender offers a separator-delimited list of charsets.
    pub const REQUEST: u8 = 1;
    /// ACCEPTED: receiver picked a charset from the offered list.
    pub const ACCEPTED: u8 = 2;
    /// REJECTED: no offered charset is acceptable.
    pub const REJECTED: u8 = 3;
    /// TTABLE-IS: sender transmits a translation table (unsupported).
    pub const TTABLE_IS: u8 = 4;
    /// TTABLE-REJECTED: translation table refused.
    pub const TTABLE_REJECTED: u8 = 5;
    /// TTABLE-ACK: translation table accepted.
    pub const TTABLE_ACK: u8 = 6;
    /// TTABLE-NAK: translation table retransmission request.
    pub const TTABLE_NAK: u8 = 7;
}

/// Human-readable name of a command byte, for trace output.
pub fn command_name(byte: u8) -> String {
    match byte {
        EOR => "EOR".into(),
        SE => "SE".into(),
        NOP => "NOP".into(),
        DM => "DM".into(),
        BRK => "BRK".into(),
        IP => "IP".into(),
        AO => "AO".into(),
        AYT => "AYT".into(),
        EC => "EC".into(),
        EL => "EL".into(),
        GA => "GA".into(),
        SB => "SB".into(),
        WILL => "WILL".into(),
        WONT => "WONT".into(),
        DO => "DO".into(),
        DONT => "DONT".into(),
        IAC => "IAC".into(),
        other => format!("{other}"),
    }
}

/// Human-readable name of an option byte, for trace output.
pub fn option_name(byte: u8) -> String {
    match byte {
        option::BINARY => "TRANSMIT-BINARY".into(),
        option::ECHO => "ECHO".into(),
        option::SGA => "SUPPRESS-GO-AHEAD".into(),
        option::EOR => "END-OF-RECORD".into(),
        option::CHARSET => "CHARSET".into(),
        other => format!("{other}"),
    }
}
