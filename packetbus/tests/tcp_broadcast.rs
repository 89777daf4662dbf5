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

fn spawn_client(addr: std::net::SocketAddr) -> (ClientSession<()>, mpsc::Receiver<Vec<u8>>) {
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
    (client, rx)
}

/// A broadcast must reach every connected client, including whichever
/// client triggered it.
#[test]
fn broadcast_reaches_every_client() {
    let server = Server::bind(
        0,
        ServerConfig::new(),
        |handle, _conn, _ctx: &(), target, body| {
            if &target[..4] == b"CHAT" {
                let _ = handle.broadcast(b"CHAT", body);
            }
        },
        (),
    )
    .unwrap();
    let addr = server.local_addr().unwrap();

    let exit_flag = Arc::new(AtomicBool::new(false));
    let server_exit = Arc::clone(&exit_flag);
    let server_thread = std::thread::spawn(move || server.run(&server_exit));

    let (client_a, rx_a) = spawn_client(addr);
    let (client_b, rx_b) = spawn_client(addr);

    client_a.send(b"CHAT", b"hi all").unwrap();

    let received_a = rx_a.recv_timeout(Duration::from_secs(1)).unwrap();
    let received_b = rx_b.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(received_a, b"hi all");
    assert_eq!(received_b, b"hi all");

    client_a.disconnect();
    client_b.disconnect();
    exit_flag.store(true, Ordering::Release);
    server_thread.join().unwrap();
}
