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

//! Incremental byte-level TELNET codec.
//!
//! [`TelnetCodec`] is a pair of transducers over the raw byte stream. The
//! decoder walks one byte at a time through a small state machine, peeling
//! IAC command sequences out of the data and canonicalizing the RFC 854
//! CR rules (`CR LF` → `\n`, `CR NUL` → `\r`). The encoder applies the
//! inverse mapping. Neither side owns any negotiation state — received
//! `DO`/`DONT`/`WILL`/`WONT` and subnegotiation blocks surface as
//! [`TelnetEvent`]s for the connection layer to route into the option
//! table and its handlers.
//!
//! Decoder state survives arbitrary buffer splits: a command half-received
//! at the end of one read resumes with the next, so short reads never
//! corrupt the stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::consts;
use crate::event::{TelnetEvent, TelnetFrame};
use crate::result::CodecError;

/// Upper bound on a buffered subnegotiation payload. Anything larger is
/// malformed by our lights and the whole block is discarded.
const SUBNEG_MAX: usize = 4096;

/// Stateful TELNET framing codec.
///
/// Implements [`Decoder`] producing [`TelnetEvent`]s and [`Encoder`]
/// consuming [`TelnetFrame`]s, the same trait pair the rest of the stack
/// builds on.
#[derive(Debug, Default)]
pub struct TelnetCodec {
    state: DecoderState,
    subneg: BytesMut,
}

impl TelnetCodec {
    /// Creates a codec in the initial (data) state.
    pub fn new() -> TelnetCodec {
        TelnetCodec::default()
    }
}

/// Decoder position within the TELNET grammar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum DecoderState {
    /// Plain data.
    #[default]
    Data,
    /// Seen a bare CR; the next byte decides what it meant.
    Cr,
    /// Seen IAC; the next byte is a command.
    Command,
    /// Seen IAC DO/DONT/WILL/WONT; the next byte is the option code.
    Negotiate(u8),
    /// Seen IAC SB; the next byte is the subnegotiation option code.
    SubnegOption,
    /// Collecting a subnegotiation payload for this option.
    Subneg(u8),
    /// Seen IAC inside a subnegotiation payload.
    SubnegIac(u8),
    /// Discarding an oversized subnegotiation until its IAC SE.
    SubnegDiscard,
    /// Seen IAC while discarding.
    SubnegDiscardIac,
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TelnetEvent>, CodecError> {
        while src.has_remaining() {
            let byte = src.get_u8();
            match (self.state, byte) {
                // -- plain data ------------------------------------------
                (DecoderState::Data, consts::IAC) => {
                    self.state = DecoderState::Command;
                }
                (DecoderState::Data, consts::CR) => {
                    self.state = DecoderState::Cr;
                }
                (DecoderState::Data, _) => {
                    return Ok(Some(TelnetEvent::Data(byte)));
                }

                // -- CR disambiguation (RFC 854: CR must be followed by
                //    NUL or LF; anything else is handled leniently) ------
                (DecoderState::Cr, consts::NUL) => {
                    self.state = DecoderState::Data;
                    return Ok(Some(TelnetEvent::Data(consts::CR)));
                }
                (DecoderState::Cr, consts::LF) => {
                    self.state = DecoderState::Data;
                    return Ok(Some(TelnetEvent::Data(consts::LF)));
                }
                (DecoderState::Cr, consts::IAC) => {
                    // The stray CR is dropped, the IAC starts a command.
                    self.state = DecoderState::Command;
                }
                (DecoderState::Cr, consts::CR) => {
                    // Consecutive CRs collapse; stay put.
                }
                (DecoderState::Cr, _) => {
                    self.state = DecoderState::Data;
                    return Ok(Some(TelnetEvent::Data(byte)));
                }

                // -- command dispatch ------------------------------------
                (DecoderState::Command, consts::IAC) => {
                    // IAC IAC is an escaped literal 0xFF data byte.
                    self.state = DecoderState::Data;
                    return Ok(Some(TelnetEvent::Data(consts::IAC)));
                }
                (
                    DecoderState::Command,
                    consts::DO | consts::DONT | consts::WILL | consts::WONT,
                ) => {
                    self.state = DecoderState::Negotiate(byte);
                }
                (DecoderState::Command, consts::SB) => {
                    self.state = DecoderState::SubnegOption;
                }
                (DecoderState::Command, _) => {
                    self.state = DecoderState::Data;
                    return Ok(Some(TelnetEvent::Command(byte)));
                }

                (DecoderState::Negotiate(cmd), _) => {
                    self.state = DecoderState::Data;
                    return Ok(Some(TelnetEvent::Negotiate(cmd, byte)));
                }

                // -- subnegotiation collection ---------------------------
                (DecoderState::SubnegOption, _) => {
                    self.subneg.clear();
                    self.state = DecoderState::Subneg(byte);
                }
                (DecoderState::Subneg(opt), consts::IAC) => {
                    self.state = DecoderState::SubnegIac(opt);
                }
                (DecoderState::Subneg(opt), _) => {
                    if self.subneg.len() >= SUBNEG_MAX {
                        debug!(
                            option = %consts::option_name(opt),
                            max = SUBNEG_MAX,
                            "oversized subnegotiation discarded"
                        );
                        self.subneg.clear();
                        self.state = DecoderState::SubnegDiscard;
                    } else {
                        self.subneg.put_u8(byte);
                    }
                }
                (DecoderState::SubnegIac(opt), consts::IAC) => {
                    // Escaped IAC inside the payload.
                    self.subneg.put_u8(consts::IAC);
                    self.state = DecoderState::Subneg(opt);
                }
                (DecoderState::SubnegIac(opt), consts::SE) => {
                    self.state = DecoderState::Data;
                    let payload = self.subneg.split().freeze();
                    return Ok(Some(TelnetEvent::Subnegotiation(opt, payload)));
                }
                (DecoderState::SubnegIac(opt), _) => {
                    debug!(
                        option = %consts::option_name(opt),
                        byte,
                        "malformed subnegotiation discarded"
                    );
                    self.subneg.clear();
                    self.state = DecoderState::Data;
                }

                (DecoderState::SubnegDiscard, consts::IAC) => {
                    self.state = DecoderState::SubnegDiscardIac;
                }
                (DecoderState::SubnegDiscard, _) => {}
                (DecoderState::SubnegDiscardIac, consts::IAC) => {
                    self.state = DecoderState::SubnegDiscard;
                }
                (DecoderState::SubnegDiscardIac, _) => {
                    // SE terminates the block; anything else was malformed
                    // anyway. Either way we are done discarding.
                    self.state = DecoderState::Data;
                }
            }
        }
        Ok(None)
    }
}

impl Encoder<TelnetFrame> for TelnetCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: TelnetFrame, dst: &mut BytesMut) -> Result<(), CodecError> {
        match frame {
            TelnetFrame::Data(bytes) => {
                dst.reserve(bytes.len() + bytes.len() / 8);
                for &byte in bytes.iter() {
                    match byte {
                        consts::IAC => {
                            dst.put_u8(consts::IAC);
                            dst.put_u8(consts::IAC);
                        }
                        consts::LF => {
                            dst.put_u8(consts::CR);
                            dst.put_u8(consts::LF);
                        }
                        consts::CR => {
                            dst.put_u8(consts::CR);
                            dst.put_u8(consts::NUL);
                        }
                        _ => dst.put_u8(byte),
                    }
                }
            }
            TelnetFrame::Command(cmd) => {
                dst.reserve(2);
                dst.put_u8(consts::IAC);
                dst.put_u8(cmd);
            }
            TelnetFrame::Negotiate(cmd, opt) => {
                dst.reserve(3);
                dst.put_u8(consts::IAC);
                dst.put_u8(cmd);
                dst.put_u8(opt);
            }
            TelnetFrame::Subnegotiation(opt, payload) => {
                dst.reserve(payload.len() + 5);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::SB);
                dst.put_u8(opt);
                for &byte in payload.iter() {
                    if byte == consts::IAC {
                        dst.put_u8(consts::IAC);
                    }
                    dst.put_u8(byte);
                }
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::SE);
            }
        }
        Ok(())
    }
}
