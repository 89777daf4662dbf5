use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use packetbus::{ClientConfig, ClientSession, Server, ServerConfig};

fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// A client sending "CHAT" to an echoing server must see its own message
/// come back, after the handshake installs the server's announced cipher.
#[test]
fn single_client_echo() {
    let server = Server::bind(
        0,
        ServerConfig::new(),
        |handle, conn, _ctx: &(), target, body| {
            if &target[..4] == b"CHAT" {
                let _ = handle.send(conn, b"CHAT", body);
            }
        },
        (),
    )
    .unwrap();
    let addr = server.local_addr().unwrap();

    let exit_flag = Arc::new(AtomicBool::new(false));
    let server_exit = Arc::clone(&exit_flag);
    let server_thread = std::thread::spawn(move || server.run(&server_exit));

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let tx = Mutex::new(tx);
    let client = ClientSession::new(
        move |_handle, _ctx: &(), target, body| {
            if &target[..4] == b"CHAT" {
                let _ = tx.lock().unwrap().send(body.to_vec());
            }
        },
        (),
        ClientConfig::new(),
    );
    client.connect(addr);

    assert!(
        wait_until(|| client.is_connected(), Duration::from_millis(500)),
        "client never completed the handshake"
    );

    client.send(b"CHAT", b"hello").unwrap();
    let received = rx
        .recv_timeout(Duration::from_secs(1))
        .expect("echo never arrived");
    assert_eq!(received, b"hello");

    client.disconnect();
    exit_flag.store(true, Ordering::Release);
    server_thread.join().unwrap();
}

/// The server announces its strategy during the handshake; a client must
/// install *that* strategy, not assume its own preset default. Here the
/// server announces `NONE`, which only round-trips correctly if the client
/// actually adopted it (its own default preset is `XOR`).
#[test]
fn handshake_propagates_servers_announced_strategy() {
    let server = Server::bind(
        0,
        ServerConfig::new(),
        |handle, conn, _ctx: &(), target, body| {
            if &target[..4] == b"CHAT" {
                let _ = handle.send(conn, b"CHAT", body);
            }
        },
        (),
    )
    .unwrap();
    server.set_strategy(packetbus::CipherPair::NONE);
    let addr = server.local_addr().unwrap();
    let exit_flag = Arc::new(AtomicBool::new(false));
    let server_exit = Arc::clone(&exit_flag);
    let server_thread = std::thread::spawn(move || server.run(&server_exit));

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let tx = Mutex::new(tx);
    let client = ClientSession::new(
        move |_handle, _ctx: &(), target, body| {
            if &target[..4] == b"CHAT" {
                let _ = tx.lock().unwrap().send(body.to_vec());
            }
        },
        (),
        ClientConfig::new(),
    );
    client.connect(addr);
    assert!(wait_until(
        || client.is_connected(),
        Duration::from_millis(500)
    ));

    client.send(b"CHAT", b"plaintext").unwrap();
    let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(received, b"plaintext");

    client.disconnect();
    exit_flag.store(true, Ordering::Release);
    server_thread.join().unwrap();
}
