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

//! Character encodings applied to the data stream after TELNET framing.
//!
//! RFC 2066 negotiation only ever lands on US-ASCII or UTF-8, so the
//! mapping is done per byte with no table lookups: ASCII squashes the high
//! half to SUB, UTF-8 passes bytes through unchanged (the stream is the
//! encoding), and `Raw` is an identity mapping used by tests and raw-log
//! tooling.

use crate::consts::SUB;
use crate::result::{CodecError, CodecResult};

/// A character encoding for the decoded data stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    /// US-ASCII. Bytes above 0x7F become SUB (0x1A) in both directions.
    #[default]
    Ascii,
    /// UTF-8. Bytes pass through unchanged in both directions.
    Utf8,
    /// Identity passthrough, indistinguishable from UTF-8 on the wire but
    /// never offered in negotiation.
    Raw,
}

impl Encoding {
    /// Resolves an IANA charset name (case-insensitive). `RAW` is accepted
    /// as an extension for testing.
    pub fn from_iana(name: &str) -> CodecResult<Encoding> {
        match name.to_ascii_uppercase().as_str() {
            "US-ASCII" | "ASCII" | "ANSI_X3.4-1968" => Ok(Encoding::Ascii),
            "UTF-8" | "UTF8" => Ok(Encoding::Utf8),
            "RAW" => Ok(Encoding::Raw),
            _ => Err(CodecError::UnsupportedCharset(name.to_string())),
        }
    }

    /// The IANA name announced in CHARSET subnegotiations.
    pub fn iana_name(&self) -> &'static str {
        match self {
            Encoding::Ascii => "US-ASCII",
            Encoding::Utf8 => "UTF-8",
            Encoding::Raw => "RAW",
        }
    }

    /// Whether the encoding carries bytes above 0x7F, and therefore wants
    /// TRANSMIT-BINARY enabled on the connection.
    pub fn is_binary(&self) -> bool {
        !matches!(self, Encoding::Ascii)
    }

    /// Maps one inbound data byte.
    pub(crate) fn decode_byte(&self, byte: u8) -> u8 {
        match self {
            Encoding::Ascii if byte > 0x7F => SUB,
            _ => byte,
        }
    }

    /// Maps one outbound data byte. Un-representable bytes become SUB
    /// rather than failing the write.
    pub(crate) fn encode_byte(&self, byte: u8) -> u8 {
        match self {
            Encoding::Ascii if byte > 0x7F => SUB,
            _ => byte,
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.iana_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iana_lookup_is_case_insensitive() {
        assert_eq!(Encoding::from_iana("utf-8").unwrap(), Encoding::Utf8);
        assert_eq!(Encoding::from_iana("US-ASCII").unwrap(), Encoding::Ascii);
        assert_eq!(Encoding::from_iana("raw").unwrap(), Encoding::Raw);
        assert!(Encoding::from_iana("ISO-8859-1").is_err());
    }

    #[test]
    fn ascii_squashes_high_bytes_both_ways() {
        assert_eq!(Encoding::Ascii.decode_byte(b'a'), b'a');
        assert_eq!(Encoding::Ascii.decode_byte(0x80), SUB);
        assert_eq!(Encoding::Ascii.encode_byte(0xE2), SUB);
        assert_eq!(Encoding::Utf8.decode_byte(0xE2), 0xE2);
        assert_eq!(Encoding::Raw.encode_byte(0xFF), 0xFF);
    }

    #[test]
    fn binary_wanted_for_everything_but_ascii() {
        assert!(!Encoding::Ascii.is_binary());
        assert!(Encoding::Utf8.is_binary());
        assert!(Encoding::Raw.is_binary());
    }
}
