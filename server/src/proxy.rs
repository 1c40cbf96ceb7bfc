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

//! Per-proxy coordinator.
//!
//! Exactly one task per proxy owns the mutable session state: the set of
//! downstream writers, the scrollback, the log file, and the upstream
//! connection. Everything else talks to it through typed channels with
//! oneshot replies, so mutation is serialized without locks and shutdown
//! is checked at every iteration of the select loop.
//!
//! Blocking socket I/O never happens on the coordinator itself. Upstream
//! reads run in a helper task that borrows the reader by value and hands
//! it back through a channel when the read completes; upstream writes run
//! in a helper task while the write channel is disarmed, which serializes
//! writers without holding the loop hostage.

use std::io;
use std::ops::ControlFlow;
use std::time::Duration;

use bytes::Bytes;
use mudmux_telnetcodec::{ConnReader, ConnWriter, Encoding, TelnetConn};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ProxyConfig;
use crate::error::{Result, ServerError};
use crate::history::History;
use crate::logfile::{self, LogFile};

/// Upstream reads are issued in chunks of this size.
const READ_CHUNK: usize = 1024;
/// How long a mount waits for charset negotiation to settle before
/// proceeding with the default encoding.
const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(1);

struct AddClientReq {
    reader: ConnReader,
    writer: ConnWriter,
    peer: String,
    reply: oneshot::Sender<Result<()>>,
}

struct WriteReq {
    buf: Bytes,
    reply: oneshot::Sender<io::Result<usize>>,
}

struct ClientSink {
    peer: String,
    writer: ConnWriter,
}

/// Cloneable handle to a proxy's coordinator loop.
#[derive(Clone)]
pub struct Proxy {
    name: String,
    add_tx: mpsc::Sender<AddClientReq>,
    close_tx: mpsc::Sender<oneshot::Sender<io::Result<()>>>,
    reopen_tx: mpsc::Sender<oneshot::Sender<io::Result<()>>>,
    write_server_tx: mpsc::Sender<WriteReq>,
    write_client_tx: mpsc::Sender<WriteReq>,
}

impl Proxy {
    /// The proxy's case-folded name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mounts a downstream client. On first mount this dials the
    /// upstream, negotiates options, and opens the log; the reply comes
    /// back as soon as those succeed. The client starts receiving
    /// broadcast bytes once both ends' charset negotiation has settled
    /// and the scrollback has been replayed to it.
    pub async fn add_client(
        &self,
        reader: ConnReader,
        writer: ConnWriter,
        peer: String,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.add_tx
            .send(AddClientReq {
                reader,
                writer,
                peer,
                reply: tx,
            })
            .await
            .map_err(|_| ServerError::ProxyClosed)?;
        rx.await.map_err(|_| ServerError::ProxyClosed)?
    }

    /// Gracefully tears the proxy down: all clients dropped, log closed
    /// with its banner, upstream closed, registry entry removed.
    pub async fn close(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.close_tx
            .send(tx)
            .await
            .map_err(|_| ServerError::ProxyClosed)?;
        let result = rx.await.map_err(|_| ServerError::ProxyClosed)?;
        Ok(result?)
    }

    /// Closes and reopens the log file under a freshly expanded name.
    pub async fn reopen_log(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.reopen_tx
            .send(tx)
            .await
            .map_err(|_| ServerError::ProxyClosed)?;
        let result = rx.await.map_err(|_| ServerError::ProxyClosed)?;
        Ok(result?)
    }

    /// Writes client input to the upstream connection.
    pub async fn write_server(&self, buf: &[u8]) -> io::Result<usize> {
        write_request(&self.write_server_tx, buf).await
    }

    /// Fans upstream output out to every mounted client and the log.
    pub async fn write_client(&self, buf: &[u8]) -> io::Result<usize> {
        write_request(&self.write_client_tx, buf).await
    }
}

async fn write_request(tx: &mpsc::Sender<WriteReq>, buf: &[u8]) -> io::Result<usize> {
    let (reply, rx) = oneshot::channel();
    tx.send(WriteReq {
        buf: Bytes::copy_from_slice(buf),
        reply,
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "proxy is shutting down"))?;
    rx.await
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "proxy is shutting down"))?
}

/// The coordinator's owned state and channel receivers.
pub(crate) struct ProxyLoop {
    name: String,
    cfg: ProxyConfig,

    add_rx: mpsc::Receiver<AddClientReq>,
    close_rx: mpsc::Receiver<oneshot::Sender<io::Result<()>>>,
    reopen_rx: mpsc::Receiver<oneshot::Sender<io::Result<()>>>,
    write_server_rx: mpsc::Receiver<WriteReq>,
    write_client_rx: mpsc::Receiver<WriteReq>,

    ready_tx: mpsc::Sender<ClientSink>,
    ready_rx: mpsc::Receiver<ClientSink>,
    read_done_tx: mpsc::Sender<ConnReader>,
    read_done_rx: mpsc::Receiver<ConnReader>,
    write_done_tx: mpsc::Sender<()>,
    write_done_rx: mpsc::Receiver<()>,

    clients: Vec<ClientSink>,
    history: History,
    log: Option<LogFile>,
    server_reader: Option<ConnReader>,
    server_writer: Option<ConnWriter>,
    read_in_flight: bool,
    write_in_flight: bool,
}

impl ProxyLoop {
    /// Builds a proxy handle and its (not yet running) coordinator.
    pub(crate) fn new(name: String, cfg: ProxyConfig) -> (Proxy, ProxyLoop) {
        let (add_tx, add_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = mpsc::channel(1);
        let (reopen_tx, reopen_rx) = mpsc::channel(1);
        let (write_server_tx, write_server_rx) = mpsc::channel(1);
        let (write_client_tx, write_client_rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let (read_done_tx, read_done_rx) = mpsc::channel(1);
        let (write_done_tx, write_done_rx) = mpsc::channel(1);

        let proxy = Proxy {
            name: name.clone(),
            add_tx,
            close_tx,
            reopen_tx,
            write_server_tx,
            write_client_tx,
        };
        let looper = ProxyLoop {
            name,
            cfg,
            add_rx,
            close_rx,
            reopen_rx,
            write_server_rx,
            write_client_rx,
            ready_tx,
            ready_rx,
            read_done_tx,
            read_done_rx,
            write_done_tx,
            write_done_rx,
            clients: Vec::new(),
            history: History::new(),
            log: None,
            server_reader: None,
            server_writer: None,
            read_in_flight: false,
            write_in_flight: false,
        };
        (proxy, looper)
    }

    /// Runs the coordinator until close or a fatal error. The `handle`
    /// is the loop's own proxy handle, passed to helper tasks.
    pub(crate) async fn run(mut self, handle: Proxy) {
        info!(proxy = %self.name, "proxy loop started");
        loop {
            self.arm_read(&handle);
            tokio::select! {
                Some(reply) = self.close_rx.recv() => {
                    self.shutdown(Some(reply)).await;
                    break;
                }
                Some(reply) = self.reopen_rx.recv() => {
                    self.handle_reopen_log(reply);
                }
                Some(req) = self.add_rx.recv() => {
                    self.handle_add_client(req, &handle).await;
                }
                Some(sink) = self.ready_rx.recv() => {
                    self.handle_client_ready(sink).await;
                }
                Some(req) = self.write_client_rx.recv() => {
                    if let ControlFlow::Break(()) = self.handle_write_client(req).await {
                        self.shutdown(None).await;
                        break;
                    }
                }
                Some(req) = self.write_server_rx.recv(), if !self.write_in_flight => {
                    self.handle_write_server(req);
                }
                Some(()) = self.write_done_rx.recv() => {
                    self.write_in_flight = false;
                }
                Some(reader) = self.read_done_rx.recv() => {
                    self.server_reader = Some(reader);
                    self.read_in_flight = false;
                }
            }
        }
    }

    /// Issues the next upstream read if the reader is home and idle.
    /// The helper task forwards whatever it got through `write_client`
    /// (serialized with everything else), then returns the reader. A
    /// failed or empty read closes the proxy.
    fn arm_read(&mut self, handle: &Proxy) {
        if self.read_in_flight {
            return;
        }
        let Some(mut reader) = self.server_reader.take() else {
            return;
        };
        self.read_in_flight = true;
        let handle = handle.clone();
        let done = self.read_done_tx.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; READ_CHUNK];
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!(proxy = %handle.name, "upstream EOF");
                    let _ = handle.close().await;
                }
                Ok(n) => {
                    if handle.write_client(&buf[..n]).await.is_ok() {
                        let _ = done.send(reader).await;
                    }
                }
                Err(e) => {
                    warn!(proxy = %handle.name, error = %e, "upstream read failed");
                    let _ = handle.close().await;
                }
            }
        });
    }

    async fn handle_add_client(&mut self, req: AddClientReq, handle: &Proxy) {
        if self.server_writer.is_none() {
            let (reader, writer) = match self.connect_upstream().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(proxy = %self.name, error = %e, "upstream connect failed");
                    let _ = req.reply.send(Err(e));
                    return;
                }
            };
            if let Some(template) = self.cfg.log.clone() {
                match LogFile::open(&template) {
                    Ok(log) => {
                        debug!(proxy = %self.name, path = %log.path().display(), "log opened");
                        self.log = Some(log);
                    }
                    Err(e) => {
                        warn!(proxy = %self.name, error = %e, "log open failed, aborting mount");
                        let _ = writer.close().await;
                        reader.close();
                        let _ = req.reply.send(Err(ServerError::Io(e)));
                        return;
                    }
                }
            }
            info!(proxy = %self.name, address = %self.cfg.address, "upstream connected");
            self.server_reader = Some(reader);
            self.server_writer = Some(writer);
        }

        // Admission waits for both ends' charset negotiation so the
        // replayed scrollback is not re-encoded mid-stream.
        let server_writer = self
            .server_writer
            .as_ref()
            .expect("upstream writer present after connect")
            .clone();
        let client_writer = req.writer;
        let peer = req.peer;
        let ready = self.ready_tx.clone();
        tokio::spawn(async move {
            await_negotiation(&server_writer).await;
            await_negotiation(&client_writer).await;
            let _ = ready
                .send(ClientSink {
                    peer,
                    writer: client_writer,
                })
                .await;
        });

        // Unbounded copy of client input into the upstream write channel.
        let proxy = handle.clone();
        let mut reader = req.reader;
        tokio::spawn(async move {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if proxy.write_server(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(proxy = %proxy.name, "client input loop ended");
        });

        let _ = req.reply.send(Ok(()));
    }

    async fn handle_client_ready(&mut self, sink: ClientSink) {
        info!(proxy = %self.name, peer = %sink.peer, "client joined");
        let replay = self.history.replay().to_vec();
        if !replay.is_empty() {
            let _ = sink.writer.write(&replay).await;
        }
        self.clients.push(sink);
    }

    /// Broadcast of upstream bytes: scrollback, every client, the log.
    /// Downstream write failures drop that client only; a log write
    /// failure is fatal to the proxy, which refuses to keep receiving
    /// without a durable record.
    async fn handle_write_client(&mut self, req: WriteReq) -> ControlFlow<()> {
        self.history.write(&req.buf);

        let mut failed = Vec::new();
        for (idx, client) in self.clients.iter().enumerate() {
            if let Err(e) = client.writer.write(&req.buf).await {
                warn!(proxy = %self.name, peer = %client.peer, error = %e, "dropping client");
                failed.push(idx);
            }
        }
        for idx in failed.into_iter().rev() {
            let sink = self.clients.swap_remove(idx);
            let _ = sink.writer.close().await;
        }

        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.write(&req.buf) {
                error!(proxy = %self.name, error = %e, "log write failed, closing proxy");
                let _ = req.reply.send(Ok(req.buf.len()));
                return ControlFlow::Break(());
            }
        }
        let _ = req.reply.send(Ok(req.buf.len()));
        ControlFlow::Continue(())
    }

    /// Starts a helper task for the blocking upstream write. The write
    /// channel stays disarmed until the helper signals completion, so
    /// upstream writes are strictly serialized.
    fn handle_write_server(&mut self, req: WriteReq) {
        let Some(writer) = self.server_writer.clone() else {
            let _ = req.reply.send(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "upstream not connected",
            )));
            return;
        };
        self.write_in_flight = true;
        let done = self.write_done_tx.clone();
        tokio::spawn(async move {
            let result = writer.write(&req.buf).await;
            let _ = req.reply.send(result);
            let _ = done.send(()).await;
        });
    }

    fn handle_reopen_log(&mut self, reply: oneshot::Sender<io::Result<()>>) {
        let result = match (self.log.take(), self.cfg.log.as_deref()) {
            (Some(log), Some(template)) => {
                if let Err(e) = log.close() {
                    warn!(proxy = %self.name, error = %e, "old log close failed");
                }
                match LogFile::open(template) {
                    Ok(log) => {
                        info!(proxy = %self.name, path = %log.path().display(), "log reopened");
                        self.log = Some(log);
                        Ok(())
                    }
                    Err(e) => {
                        error!(proxy = %self.name, error = %e, "log reopen failed, logging disabled");
                        Err(e)
                    }
                }
            }
            (log, _) => {
                // No log open; nothing to rotate.
                self.log = log;
                Ok(())
            }
        };
        let _ = reply.send(result);
    }

    async fn shutdown(&mut self, reply: Option<oneshot::Sender<io::Result<()>>>) {
        for sink in self.clients.drain(..) {
            let _ = sink.writer.close().await;
        }
        if let Some(log) = self.log.take() {
            if let Err(e) = log.close() {
                warn!(proxy = %self.name, error = %e, "log close failed");
            }
        }
        let result = match self.server_writer.take() {
            Some(writer) => writer.close().await,
            None => Ok(()),
        };
        if let Some(reader) = self.server_reader.take() {
            reader.close();
        }
        info!(proxy = %self.name, "disconnected");
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    /// Dials the upstream, applies the configured default encoding and
    /// raw tap, negotiates options, and sends the onconnect line.
    async fn connect_upstream(&self) -> Result<(ConnReader, ConnWriter)> {
        debug!(proxy = %self.name, address = %self.cfg.address, "dialing upstream");
        let stream = TcpStream::connect(&self.cfg.address).await?;
        let mut conn = TelnetConn::client(stream);

        if let Some(name) = &self.cfg.encoding {
            conn.set_encoding(Encoding::from_iana(name)?).await;
        }
        if self.cfg.raw {
            if let Some(template) = &self.cfg.log {
                match logfile::open_raw(template) {
                    Ok(file) => conn.set_raw_log_sink(Box::new(file)),
                    Err(e) => warn!(proxy = %self.name, error = %e, "raw log open failed"),
                }
            }
        }

        conn.negotiate_options().await?;
        if let Some(line) = &self.cfg.onconnect {
            conn.writer().write_line(line).await?;
        }
        Ok(conn.split())
    }
}

/// Waits for charset negotiation to settle, forcing the default-encoding
/// fallback when the peer stays silent past the timeout.
async fn await_negotiation(writer: &ConnWriter) {
    let mut settled = writer.negotiation_settled();
    let timed_out = timeout(NEGOTIATION_TIMEOUT, settled.wait_for(|v| *v))
        .await
        .is_err();
    if timed_out {
        debug!("charset negotiation timed out, using the default encoding");
        let _ = writer.finish_negotiation().await;
    }
}
