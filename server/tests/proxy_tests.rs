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

//! Proxy lifecycle, fan-out, and auth handshake tests.

use std::time::Duration;

use mudmux_server::{session, Config, ProxyRegistry};
use mudmux_telnetcodec::TelnetConn;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

/// Binds a throwaway upstream that accepts one connection, optionally
/// greets, and then sits on the socket echoing nothing. Returns its
/// address and a handle receiving everything the proxy sent it.
async fn fake_upstream(greeting: Option<&'static str>) -> (String, tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        if let Some(text) = greeting {
            socket.write_all(text.as_bytes()).await.unwrap();
        }
        let mut buf = [0u8; 1024];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    (addr, rx)
}

fn config_for(addr: &str) -> Config {
    Config::parse(&format!(
        r#"
password: secret
proxies:
  mud:
    address: "{addr}"
"#
    ))
    .unwrap()
}

/// A downstream client as the proxy sees one: a server-role connection
/// over an in-memory duplex. Returns the far (client-software) end.
fn new_client() -> (TelnetConn, DuplexStream) {
    let (near, far) = tokio::io::duplex(64 * 1024);
    (TelnetConn::server(near), far)
}

/// Reads from `stream` until the collected bytes contain `needle`.
async fn read_until(stream: &mut DuplexStream, needle: &[u8], label: &str) -> Vec<u8> {
    let mut collected = Vec::new();
    let deadline = Duration::from_secs(5);
    timeout(deadline, async {
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.expect(label);
            assert!(n > 0, "EOF while waiting for {label}");
            collected.extend_from_slice(&buf[..n]);
            if collected
                .windows(needle.len())
                .any(|window| window == needle)
            {
                break;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {label}"));
    collected
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn broadcast_reaches_all_clients_and_drops_the_failed_one() {
    let (addr, _upstream_rx) = fake_upstream(None).await;
    let registry = ProxyRegistry::new(config_for(&addr));
    let proxy = registry.find("mud").expect("proxy configured");

    // First client; the upstream never negotiates, so admission takes the
    // one-second charset fallback.
    let (conn_a, mut far_a) = new_client();
    let (reader_a, writer_a) = conn_a.split();
    proxy
        .add_client(reader_a, writer_a, "a".into())
        .await
        .unwrap();
    sleep(Duration::from_millis(1500)).await;

    proxy.write_client(b"X\n").await.unwrap();
    read_until(&mut far_a, b"X\r\n", "first broadcast to A").await;

    // Second client whose socket is already gone: it gets the scrollback
    // replay attempt and is dropped on the first failing write.
    let (conn_b, far_b) = new_client();
    drop(far_b);
    let (reader_b, writer_b) = conn_b.split();
    proxy
        .add_client(reader_b, writer_b, "b".into())
        .await
        .unwrap();

    // Third client joins late and must see the scrollback first.
    let (conn_c, mut far_c) = new_client();
    let (reader_c, writer_c) = conn_c.split();
    proxy
        .add_client(reader_c, writer_c, "c".into())
        .await
        .unwrap();
    sleep(Duration::from_millis(300)).await;

    proxy.write_client(b"Y\n").await.unwrap();

    let got_c = read_until(&mut far_c, b"Y\r\n", "broadcast to C").await;
    let x = got_c
        .windows(3)
        .position(|w| w == b"X\r\n")
        .expect("C missed the scrollback replay");
    let y = got_c.windows(3).position(|w| w == b"Y\r\n").unwrap();
    assert!(x < y, "replay must precede the live broadcast");

    // A keeps receiving after B's removal.
    proxy.write_client(b"Z\n").await.unwrap();
    let got_a = read_until(&mut far_a, b"Z\r\n", "third broadcast to A").await;
    assert!(contains(&got_a, b"Y\r\n"));

    registry.close_all().await;
}

#[tokio::test]
async fn wrong_password_is_rejected_without_starting_a_proxy() {
    let (addr, _upstream_rx) = fake_upstream(None).await;
    let registry = ProxyRegistry::new(config_for(&addr));

    let (conn, mut far) = new_client();
    let session_task = tokio::spawn(session::run_session(
        conn,
        "test-peer".into(),
        registry.clone(),
    ));

    read_until(&mut far, b"connects you to an existing world", "MOTD").await;
    far.write_all(b"connect mud wrongpass\r\n").await.unwrap();

    let got = read_until(&mut far, b"invalid proxy name or password\r\n", "rejection").await;
    assert!(!contains(&got, b"error connecting"));
    session_task.await.unwrap();

    // The handshake failed before the registry ever spawned a loop.
    assert!(registry.is_empty());
}

#[tokio::test]
async fn unknown_proxy_name_gets_the_same_rejection() {
    let (addr, _upstream_rx) = fake_upstream(None).await;
    let registry = ProxyRegistry::new(config_for(&addr));

    let (conn, mut far) = new_client();
    tokio::spawn(session::run_session(conn, "peer".into(), registry.clone()));

    read_until(&mut far, b"connects you to an existing world", "MOTD").await;
    far.write_all(b"connect nosuchworld secret\r\n")
        .await
        .unwrap();
    read_until(&mut far, b"invalid proxy name or password\r\n", "rejection").await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn authenticated_session_bridges_both_directions() {
    let (addr, mut upstream_rx) = fake_upstream(Some("Hello world\n")).await;
    let registry = ProxyRegistry::new(config_for(&addr));

    let (conn, mut far) = new_client();
    tokio::spawn(session::run_session(conn, "peer".into(), registry.clone()));

    read_until(&mut far, b"connects you to an existing world", "MOTD").await;
    far.write_all(b"connect MUD secret\r\n").await.unwrap();

    // Upstream output reaches the client once admission completes.
    read_until(&mut far, b"Hello world\r\n", "upstream greeting").await;

    // Client input reaches the upstream.
    far.write_all(b"look\r\n").await.unwrap();
    let deadline = Duration::from_secs(5);
    timeout(deadline, async {
        let mut seen = Vec::new();
        loop {
            let chunk = upstream_rx.recv().await.expect("upstream closed");
            seen.extend_from_slice(&chunk);
            if contains(&seen, b"look\r\n") {
                break;
            }
        }
    })
    .await
    .expect("upstream never saw the client's input");

    // Shutdown closes the downstream socket.
    registry.close_all().await;
    timeout(deadline, async {
        let mut buf = [0u8; 256];
        loop {
            match far.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await
    .expect("client socket never closed");

    // The loop removes its registry entry on the way out.
    timeout(deadline, async {
        while !registry.is_empty() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("registry entry never removed");
}
