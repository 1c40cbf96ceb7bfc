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

//! TELNET connection wrapper.
//!
//! [`TelnetConn`] composes the byte codec, the option table, and the
//! registered option handlers over any async byte stream. Reads decode the
//! wire into application bytes, routing negotiation commands and
//! subnegotiations through the option machinery; replies those generate
//! are flushed back to the peer before the read returns. Writes run the
//! opposite direction: character encoding, then TELNET framing.
//!
//! The connection splits into a [`ConnReader`] and a cloneable
//! [`ConnWriter`] so one task can own the read loop while any number of
//! tasks write. All shared state sits behind the writer handle; dropping
//! both halves closes the stream.

use std::collections::HashMap;
use std::io;
use std::io::Write as _;
use std::sync::{Arc, Mutex as StdMutex};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::charset::{Action, CharsetDriver, OptionHandler};
use crate::codec::TelnetCodec;
use crate::consts::{self, option};
use crate::encoding::Encoding;
use crate::event::{TelnetEvent, TelnetFrame};
use crate::option::{OptionTable, Side};

/// Which end of the proxying relationship this connection is: `Client`
/// connections are dialed out by us (the peer is a server), `Server`
/// connections are accepted by us (the peer is a client).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// We dialed; the peer is the remote world.
    Client,
    /// We accepted; the peer is a downstream client.
    Server,
}

/// State shared between the read path and the control surface: codec,
/// option table, handlers, and the inbound encoding.
struct Core {
    role: Role,
    codec: TelnetCodec,
    options: OptionTable,
    handlers: HashMap<u8, OptionHandler>,
    in_enc: Encoding,
}

impl Core {
    fn new(role: Role) -> Core {
        let mut handlers = HashMap::new();
        let charset = OptionHandler::Charset(CharsetDriver::new());
        handlers.insert(charset.code(), charset);
        Core {
            role,
            codec: TelnetCodec::new(),
            options: OptionTable::new(),
            handlers,
            in_enc: Encoding::default(),
        }
    }

    fn handle_negotiate(
        &mut self,
        cmd: u8,
        code: u8,
        out: &mut Vec<TelnetFrame>,
        actions: &mut Vec<Action>,
    ) {
        if let Some(change) = self.options.receive(cmd, code, out) {
            let Core {
                handlers,
                options,
                role,
                ..
            } = self;
            match handlers.get_mut(&change.code) {
                Some(OptionHandler::Charset(driver)) => {
                    driver.on_option_change(*role, options, out, actions);
                }
                None => debug!(
                    option = %consts::option_name(change.code),
                    side = ?change.side,
                    enabled = change.enabled,
                    "option settled"
                ),
            }
        }
    }

    fn handle_subnegotiation(
        &mut self,
        code: u8,
        payload: &[u8],
        out: &mut Vec<TelnetFrame>,
        actions: &mut Vec<Action>,
    ) {
        let Core {
            handlers,
            options,
            role,
            ..
        } = self;
        match handlers.get_mut(&code) {
            Some(OptionHandler::Charset(driver)) => {
                driver.on_subnegotiation(payload, *role, options, out, actions);
            }
            None => debug!(
                option = %consts::option_name(code),
                len = payload.len(),
                "subnegotiation with no handler dropped"
            ),
        }
    }
}

/// Write-side state: the raw write half, encoder, outbound encoding, and
/// the charset pending buffer.
struct WriteState {
    io: Box<dyn AsyncWrite + Send + Unpin>,
    codec: TelnetCodec,
    out_enc: Encoding,
    buffering: bool,
    pending: BytesMut,
    settled_tx: watch::Sender<bool>,
}

impl WriteState {
    /// Character-encodes and frames application bytes onto the wire.
    async fn write_data(&mut self, buf: &[u8]) -> io::Result<()> {
        let encoded: Vec<u8> = buf.iter().map(|&b| self.out_enc.encode_byte(b)).collect();
        let mut dst = BytesMut::with_capacity(encoded.len() + 8);
        self.codec
            .encode(TelnetFrame::Data(Bytes::from(encoded)), &mut dst)
            .map_err(io::Error::from)?;
        self.io.write_all(&dst).await?;
        self.io.flush().await
    }
}

/// Cloneable write handle for a [`TelnetConn`].
///
/// Application bytes written here are character-encoded under the current
/// outbound encoding and TELNET-framed; each call is atomic with respect
/// to escape sequences. While a CHARSET exchange is pending, writes queue
/// in memory and are flushed through the finally-selected encoding, in
/// order, exactly once.
#[derive(Clone)]
pub struct ConnWriter {
    state: Arc<AsyncMutex<WriteState>>,
    settled: watch::Receiver<bool>,
}

impl ConnWriter {
    /// Writes application bytes. Returns the number of bytes accepted,
    /// which is always the whole buffer unless the stream fails.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut st = self.state.lock().await;
        if st.buffering {
            st.pending.extend_from_slice(buf);
            return Ok(buf.len());
        }
        st.write_data(buf).await?;
        Ok(buf.len())
    }

    /// Writes a text line, newline-terminated.
    pub async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.write(&bytes).await.map(|_| ())
    }

    /// Sends pre-built control frames, bypassing the charset buffer.
    /// Negotiation must keep flowing while application writes are gated.
    pub(crate) async fn send_frames(&self, frames: &[TelnetFrame]) -> io::Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        let mut st = self.state.lock().await;
        let mut dst = BytesMut::new();
        for frame in frames {
            debug!("SENT {frame}");
            st.codec
                .encode(frame.clone(), &mut dst)
                .map_err(io::Error::from)?;
        }
        st.io.write_all(&dst).await?;
        st.io.flush().await
    }

    pub(crate) async fn begin_buffering(&self) {
        self.state.lock().await.buffering = true;
    }

    /// Marks negotiation as in flight so `negotiation_settled` waits.
    pub(crate) async fn arm_negotiation(&self) {
        let st = self.state.lock().await;
        let _ = st.settled_tx.send(false);
    }

    /// Applies a charset verdict: installs the encoding (if one was
    /// chosen), releases the write gate, and flushes queued bytes.
    pub(crate) async fn finish_charset(&self, enc: Option<Encoding>) -> io::Result<()> {
        let mut st = self.state.lock().await;
        if let Some(enc) = enc {
            st.out_enc = enc;
        }
        if st.buffering {
            st.buffering = false;
            let pending = st.pending.split();
            if !pending.is_empty() {
                st.write_data(&pending).await?;
            }
        }
        let _ = st.settled_tx.send(true);
        Ok(())
    }

    /// Forces the negotiation gate open with no encoding change. Callers
    /// use this after their timeout expires; the connection proceeds under
    /// its default encoding. Idempotent.
    pub async fn finish_negotiation(&self) -> io::Result<()> {
        self.finish_charset(None).await
    }

    /// A watch that turns `true` once charset negotiation has settled
    /// (or was never armed). Callers bound the wait with their own
    /// timeout, conventionally one second.
    pub fn negotiation_settled(&self) -> watch::Receiver<bool> {
        self.settled.clone()
    }

    /// Shuts down the write half of the stream. Idempotent.
    pub async fn close(&self) -> io::Result<()> {
        let mut st = self.state.lock().await;
        match st.io.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }
}

type RawTap = Arc<StdMutex<Option<Box<dyn io::Write + Send>>>>;

/// Read half of a [`TelnetConn`]. Owns the decoder pipeline.
pub struct ConnReader {
    io: Box<dyn AsyncRead + Send + Sync + Unpin>,
    core: Arc<StdMutex<Core>>,
    writer: ConnWriter,
    inbuf: BytesMut,
    decoded: BytesMut,
    raw_tap: RawTap,
}

impl ConnReader {
    /// Reads decoded application bytes. Control traffic is consumed
    /// internally; `Ok(0)` means end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if !self.decoded.is_empty() {
                let n = buf.len().min(self.decoded.len());
                buf[..n].copy_from_slice(&self.decoded[..n]);
                self.decoded.advance(n);
                return Ok(n);
            }
            if !self.fill().await? {
                return Ok(0);
            }
        }
    }

    /// Reads one newline-terminated line, trimmed of surrounding
    /// whitespace. Returns `None` at end of stream. Lines longer than
    /// `max` bytes are an error.
    pub async fn read_line(&mut self, max: usize) -> io::Result<Option<String>> {
        loop {
            if let Some(i) = self.decoded.iter().position(|&b| b == b'\n') {
                let line = self.decoded.split_to(i + 1);
                let text = String::from_utf8_lossy(&line[..i]).trim().to_string();
                return Ok(Some(text));
            }
            if self.decoded.len() > max {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "line exceeds maximum length",
                ));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Pulls one chunk off the stream and runs it through the decoder.
    /// Returns `false` at end of stream.
    async fn fill(&mut self) -> io::Result<bool> {
        let mut tmp = [0u8; 1024];
        let n = self.io.read(&mut tmp).await?;
        if n == 0 {
            return Ok(false);
        }
        self.tee_raw(&tmp[..n]);
        self.inbuf.extend_from_slice(&tmp[..n]);
        let (frames, actions) = self.decode_pending()?;
        self.writer.send_frames(&frames).await?;
        for action in actions {
            match action {
                Action::BeginBuffering => self.writer.begin_buffering().await,
                Action::Finish(enc) => self.writer.finish_charset(enc).await?,
            }
        }
        Ok(true)
    }

    /// Drains the input buffer through the codec under the core lock.
    /// Reply frames and handler actions are returned for the async side
    /// to apply; the lock is never held across an await.
    fn decode_pending(&mut self) -> io::Result<(Vec<TelnetFrame>, Vec<Action>)> {
        let mut core = self.core.lock().expect("connection core poisoned");
        let mut frames = Vec::new();
        let mut actions = Vec::new();
        let mut applied = 0;
        loop {
            match core.codec.decode(&mut self.inbuf).map_err(io::Error::from)? {
                Some(TelnetEvent::Data(byte)) => {
                    let byte = core.in_enc.decode_byte(byte);
                    self.decoded.put_u8(byte);
                }
                Some(TelnetEvent::Command(cmd)) => {
                    debug!("RECV IAC {}", consts::command_name(cmd));
                }
                Some(TelnetEvent::Negotiate(cmd, code)) => {
                    core.handle_negotiate(cmd, code, &mut frames, &mut actions);
                }
                Some(TelnetEvent::Subnegotiation(code, payload)) => {
                    core.handle_subnegotiation(code, &payload, &mut frames, &mut actions);
                }
                None => break,
            }
            // An encoding switch takes effect between input bytes: data
            // already in `decoded` used the old mapping, everything still
            // in `inbuf` must use the new one.
            for action in &actions[applied..] {
                if let Action::Finish(Some(enc)) = action {
                    core.in_enc = *enc;
                }
            }
            applied = actions.len();
        }
        Ok((frames, actions))
    }

    fn tee_raw(&mut self, bytes: &[u8]) {
        let mut tap = self.raw_tap.lock().expect("raw tap poisoned");
        if let Some(sink) = tap.as_mut() {
            if let Err(e) = sink.write_all(bytes) {
                warn!(error = %e, "raw log write failed, disabling tap");
                *tap = None;
            }
        }
    }

    /// Releases the read half, flushing and dropping the raw log sink
    /// deterministically rather than leaving it to an eventual drop.
    pub fn close(self) {
        let mut tap = self.raw_tap.lock().expect("raw tap poisoned");
        if let Some(mut sink) = tap.take() {
            if let Err(e) = sink.flush() {
                warn!(error = %e, "raw log flush failed on close");
            }
        }
    }
}

/// A TELNET connection over an arbitrary async byte stream.
pub struct TelnetConn {
    reader: ConnReader,
    writer: ConnWriter,
    core: Arc<StdMutex<Core>>,
}

impl TelnetConn {
    /// Wraps an outbound (dialed) connection; the peer is a server.
    pub fn client<S>(stream: S) -> TelnetConn
    where
        S: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
    {
        TelnetConn::wrap(Role::Client, stream)
    }

    /// Wraps an accepted connection; the peer is a client.
    pub fn server<S>(stream: S) -> TelnetConn
    where
        S: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
    {
        TelnetConn::wrap(Role::Server, stream)
    }

    fn wrap<S>(role: Role, stream: S) -> TelnetConn
    where
        S: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let core = Arc::new(StdMutex::new(Core::new(role)));
        let (settled_tx, settled_rx) = watch::channel(true);
        let writer = ConnWriter {
            state: Arc::new(AsyncMutex::new(WriteState {
                io: Box::new(write_half),
                codec: TelnetCodec::new(),
                out_enc: Encoding::default(),
                buffering: false,
                pending: BytesMut::new(),
                settled_tx,
            })),
            settled: settled_rx,
        };
        let reader = ConnReader {
            io: Box::new(read_half),
            core: Arc::clone(&core),
            writer: writer.clone(),
            inbuf: BytesMut::new(),
            decoded: BytesMut::new(),
            raw_tap: Arc::new(StdMutex::new(None)),
        };
        TelnetConn {
            reader,
            writer,
            core,
        }
    }

    /// Applies the role's initial option policy and kicks off negotiation:
    /// client connections request END-OF-RECORD and SUPPRESS-GO-AHEAD for
    /// both sides, every connection requests CHARSET for both sides. The
    /// charset settle gate is armed; [`ConnWriter::negotiation_settled`]
    /// reports when it resolves.
    pub async fn negotiate_options(&mut self) -> io::Result<()> {
        let frames = {
            let mut core = self.core.lock().expect("connection core poisoned");
            core.options.allow(option::BINARY, true, true);
            core.options.allow(option::SGA, true, true);
            core.options.allow(option::EOR, true, true);
            core.options.allow(option::CHARSET, true, true);

            let mut out = Vec::new();
            if core.role == Role::Client {
                core.options.ask_enable(option::EOR, Side::Local, &mut out);
                core.options.ask_enable(option::EOR, Side::Remote, &mut out);
                core.options.ask_enable(option::SGA, Side::Local, &mut out);
                core.options.ask_enable(option::SGA, Side::Remote, &mut out);
            }
            core.options
                .ask_enable(option::CHARSET, Side::Local, &mut out);
            core.options
                .ask_enable(option::CHARSET, Side::Remote, &mut out);
            out
        };
        self.writer.arm_negotiation().await;
        self.writer.send_frames(&frames).await
    }

    /// Sets the stream encoding for both directions. Meant for applying a
    /// configured default before negotiation has had its say.
    pub async fn set_encoding(&self, enc: Encoding) {
        self.core.lock().expect("connection core poisoned").in_enc = enc;
        self.writer.state.lock().await.out_enc = enc;
    }

    /// Tees the raw, pre-decode byte stream into `sink` for audit
    /// logging. Safe to call while reads are in flight; a failing sink is
    /// dropped.
    pub fn set_raw_log_sink(&self, sink: Box<dyn io::Write + Send>) {
        *self.reader.raw_tap.lock().expect("raw tap poisoned") = Some(sink);
    }

    /// Registers (or replaces) the handler for its declared option code.
    pub fn register_handler(&self, handler: OptionHandler) {
        let mut core = self.core.lock().expect("connection core poisoned");
        core.handlers.insert(handler.code(), handler);
    }

    /// Whether an option has negotiated to enabled on the given side.
    pub fn option_enabled(&self, code: u8, side: Side) -> bool {
        self.core
            .lock()
            .expect("connection core poisoned")
            .options
            .enabled(code, side)
    }

    /// One-shot receiver fulfilled at the option's next terminal
    /// transition on `side`. See [`OptionTable::on_settled`].
    pub fn on_option_settled(&self, code: u8, side: Side) -> oneshot::Receiver<bool> {
        self.core
            .lock()
            .expect("connection core poisoned")
            .options
            .on_settled(code, side)
    }

    /// Reads decoded application bytes.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).await
    }

    /// Reads one trimmed, newline-terminated line.
    pub async fn read_line(&mut self, max: usize) -> io::Result<Option<String>> {
        self.reader.read_line(max).await
    }

    /// Writes application bytes.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf).await
    }

    /// A cloneable handle to the write side.
    pub fn writer(&self) -> ConnWriter {
        self.writer.clone()
    }

    /// Splits into the read half and a write handle.
    pub fn split(self) -> (ConnReader, ConnWriter) {
        (self.reader, self.writer)
    }

    /// Shuts down the write side of the stream.
    pub async fn close(&self) -> io::Result<()> {
        self.writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{charset, option};
    use crate::option::QState;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt as _;

    /// Feeds `input` into a connection of the given role and returns
    /// (decoded bytes we read, raw bytes the connection wrote back).
    /// `setup` runs before any decoding, with access to the connection.
    async fn decode_test(
        role: Role,
        input: &[u8],
        setup: impl FnOnce(&TelnetConn),
    ) -> (Vec<u8>, Vec<u8>) {
        let (local, remote) = tokio::io::duplex(16 * 1024);
        let mut conn = TelnetConn::wrap(role, local);
        setup(&conn);

        let (mut peer_read, mut peer_write) = tokio::io::split(remote);
        peer_write.write_all(input).await.unwrap();
        peer_write.shutdown().await.unwrap();

        let mut decoded = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = tokio::time::timeout(Duration::from_secs(5), conn.read(&mut buf))
                .await
                .expect("read timed out")
                .expect("read failed");
            if n == 0 {
                break;
            }
            decoded.extend_from_slice(&buf[..n]);
        }
        conn.close().await.unwrap();

        let mut written = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), peer_read.read_to_end(&mut written))
            .await
            .expect("peer read timed out")
            .expect("peer read failed");
        (decoded, written)
    }

    fn force_charset_enabled(conn: &TelnetConn) {
        let mut core = conn.core.lock().unwrap();
        core.options.allow(option::CHARSET, true, true);
        core.options.allow(option::BINARY, true, true);
        let mut scratch = Vec::new();
        core.options
            .ask_enable(option::CHARSET, Side::Remote, &mut scratch);
        let _ = core
            .options
            .receive(consts::WILL, option::CHARSET, &mut scratch);
        assert_eq!(core.options.state(option::CHARSET, Side::Remote), QState::Yes);
    }

    #[tokio::test]
    async fn subnegotiation_removed_from_stream() {
        let input = [
            b'h',
            consts::IAC,
            consts::SB,
            b'f',
            b'o',
            b'o',
            consts::IAC,
            consts::SE,
            b'i',
        ];
        let (decoded, written) = decode_test(Role::Server, &input, |_| {}).await;
        assert_eq!(decoded, b"hi");
        assert_eq!(written, b"");
    }

    #[tokio::test]
    async fn charset_request_rejected_when_not_enabled() {
        let mut input = vec![b'h', consts::IAC, consts::SB, option::CHARSET, charset::REQUEST];
        input.extend_from_slice(b";UTF-8;US-ASCII");
        input.extend_from_slice(&[consts::IAC, consts::SE, b'i']);
        let (decoded, written) = decode_test(Role::Server, &input, |_| {}).await;
        assert_eq!(decoded, b"hi");
        assert_eq!(
            written,
            vec![
                consts::IAC,
                consts::SB,
                option::CHARSET,
                charset::REJECTED,
                consts::IAC,
                consts::SE,
            ]
        );
    }

    #[tokio::test]
    async fn charset_request_rejected_on_client_connection() {
        let mut input = vec![b'h', consts::IAC, consts::SB, option::CHARSET, charset::REQUEST];
        input.extend_from_slice(b";UTF-8;US-ASCII");
        input.extend_from_slice(&[consts::IAC, consts::SE, b'i']);
        let (decoded, written) =
            decode_test(Role::Client, &input, force_charset_enabled).await;
        assert_eq!(decoded, b"hi");
        assert_eq!(
            written,
            vec![
                consts::IAC,
                consts::SB,
                option::CHARSET,
                charset::REJECTED,
                consts::IAC,
                consts::SE,
            ]
        );
    }

    #[tokio::test]
    async fn buggy_peer_request_treated_as_accept() {
        let mut input = vec![b'h', consts::IAC, consts::SB, option::CHARSET, charset::REQUEST];
        input.extend_from_slice(b"UTF-8");
        input.extend_from_slice(&[consts::IAC, consts::SE, b'i']);
        let (decoded, written) =
            decode_test(Role::Client, &input, force_charset_enabled).await;
        assert_eq!(decoded, b"hi");
        assert_eq!(
            written,
            vec![
                consts::IAC,
                consts::WILL,
                option::BINARY,
                consts::IAC,
                consts::DO,
                option::BINARY,
            ]
        );
    }

    #[tokio::test]
    async fn charset_accept_utf8_switches_decoding() {
        // 0x80 before the switch decodes under ASCII to SUB; the UTF-8
        // sequence after the switch passes through intact.
        let mut input = vec![0x80, consts::IAC, consts::SB, option::CHARSET, charset::REQUEST];
        input.extend_from_slice(b"[TTABLE]\x01;UTF-8;ISO-8859-1;US-ASCII;CP437");
        input.extend_from_slice(&[consts::IAC, consts::SE, 0xE2, 0x80, 0xBB]);
        let (decoded, written) =
            decode_test(Role::Server, &input, force_charset_enabled).await;

        let mut expected_decoded = vec![0x1A];
        expected_decoded.extend_from_slice("※".as_bytes());
        assert_eq!(decoded, expected_decoded);

        let mut expected = vec![consts::IAC, consts::SB, option::CHARSET, charset::ACCEPTED];
        expected.extend_from_slice(b"UTF-8");
        expected.extend_from_slice(&[consts::IAC, consts::SE]);
        expected.extend_from_slice(&[consts::IAC, consts::WILL, option::BINARY]);
        expected.extend_from_slice(&[consts::IAC, consts::DO, option::BINARY]);
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn charset_accepted_reply_switches_decoding() {
        let mut input = vec![b'h', consts::IAC, consts::SB, option::CHARSET, charset::ACCEPTED];
        input.extend_from_slice(b"UTF-8");
        input.extend_from_slice(&[consts::IAC, consts::SE, b'i']);
        let (decoded, written) =
            decode_test(Role::Client, &input, force_charset_enabled).await;
        assert_eq!(decoded, b"hi");
        assert_eq!(
            written,
            vec![
                consts::IAC,
                consts::WILL,
                option::BINARY,
                consts::IAC,
                consts::DO,
                option::BINARY,
            ]
        );
    }

    #[tokio::test]
    async fn refused_enable_request_gets_negative_reply() {
        // ECHO is not in the allow table, so DO ECHO draws WONT ECHO.
        let input = [b'h', consts::IAC, consts::DO, option::ECHO, b'i'];
        let (decoded, written) = decode_test(Role::Server, &input, |_| {}).await;
        assert_eq!(decoded, b"hi");
        assert_eq!(written, vec![consts::IAC, consts::WONT, option::ECHO]);
    }

    #[tokio::test]
    async fn raw_tap_sees_bytes_before_decoding() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct Tap(Arc<Mutex<Vec<u8>>>);
        impl io::Write for Tap {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let tap = Tap(Arc::new(Mutex::new(Vec::new())));
        let input = [b'h', consts::IAC, consts::DO, option::ECHO, b'i'];
        let tap_clone = tap.clone();
        let (decoded, _) = decode_test(Role::Server, &input, move |conn| {
            conn.set_raw_log_sink(Box::new(tap_clone));
        })
        .await;

        assert_eq!(decoded, b"hi");
        assert_eq!(tap.0.lock().unwrap().as_slice(), &input);
    }

    #[tokio::test]
    async fn writes_buffer_until_charset_finishes() {
        let (local, remote) = tokio::io::duplex(16 * 1024);
        let conn = TelnetConn::wrap(Role::Client, local);
        conn.set_encoding(Encoding::Raw).await;

        let writer = conn.writer();
        writer.begin_buffering().await;
        writer.write("※ hello ".as_bytes()).await.unwrap();
        writer.finish_charset(None).await.unwrap();
        writer.write("※ world ※".as_bytes()).await.unwrap();
        writer.close().await.unwrap();
        drop(conn);

        let (mut peer_read, peer_write) = tokio::io::split(remote);
        drop(peer_write);
        let mut written = Vec::new();
        peer_read.read_to_end(&mut written).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&written), "※ hello ※ world ※");
    }

    #[tokio::test]
    async fn buffered_writes_flush_under_the_new_encoding() {
        let (local, remote) = tokio::io::duplex(16 * 1024);
        let conn = TelnetConn::wrap(Role::Client, local);

        let writer = conn.writer();
        writer.begin_buffering().await;
        // Non-ASCII bytes queued while pending...
        writer.write("※".as_bytes()).await.unwrap();
        // ...must come out under the finalized encoding, not ASCII.
        writer.finish_charset(Some(Encoding::Utf8)).await.unwrap();
        writer.close().await.unwrap();
        drop(conn);

        let (mut peer_read, peer_write) = tokio::io::split(remote);
        drop(peer_write);
        let mut written = Vec::new();
        peer_read.read_to_end(&mut written).await.unwrap();
        assert_eq!(written, "※".as_bytes());
    }

    #[tokio::test]
    async fn negotiate_options_announces_role_policy() {
        let (local, remote) = tokio::io::duplex(16 * 1024);
        let mut conn = TelnetConn::client(local);
        conn.negotiate_options().await.unwrap();
        conn.close().await.unwrap();
        drop(conn);

        let (mut peer_read, peer_write) = tokio::io::split(remote);
        drop(peer_write);
        let mut written = Vec::new();
        peer_read.read_to_end(&mut written).await.unwrap();
        assert_eq!(
            written,
            vec![
                consts::IAC,
                consts::WILL,
                option::EOR,
                consts::IAC,
                consts::DO,
                option::EOR,
                consts::IAC,
                consts::WILL,
                option::SGA,
                consts::IAC,
                consts::DO,
                option::SGA,
                consts::IAC,
                consts::WILL,
                option::CHARSET,
                consts::IAC,
                consts::DO,
                option::CHARSET,
            ]
        );
    }
}
