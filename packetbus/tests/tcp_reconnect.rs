use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
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

fn run_server(port: u16) -> (Server<()>, std::net::SocketAddr) {
    let server = Server::bind(port, ServerConfig::new(), |_, _, _: &(), _, _| {}, ()).unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

/// A client must notice a dropped server, mark itself disconnected, and
/// reconnect on its own once a server becomes reachable again at the same
/// address.
#[test]
fn client_reconnects_after_server_restart() {
    let (server1, addr) = run_server(0);
    let exit1 = Arc::new(AtomicBool::new(false));
    let server1_exit = Arc::clone(&exit1);
    let server1_thread = std::thread::spawn(move || server1.run(&server1_exit));

    let client = ClientSession::new(
        |_, _: &(), _, _| {},
        (),
        ClientConfig::new().with_reconnect_interval(Duration::from_millis(100)),
    );
    client.connect(addr);
    assert!(
        wait_until(|| client.is_connected(), Duration::from_millis(500)),
        "client never connected to first server"
    );

    exit1.store(true, Ordering::Release);
    server1_thread.join().unwrap();
    assert!(
        wait_until(|| !client.is_connected(), Duration::from_secs(1)),
        "client never noticed the server going away"
    );

    let (server2, _addr2) = run_server(addr.port());
    let exit2 = Arc::new(AtomicBool::new(false));
    let server2_exit = Arc::clone(&exit2);
    let server2_thread = std::thread::spawn(move || server2.run(&server2_exit));

    assert!(
        wait_until(|| client.is_connected(), Duration::from_secs(2)),
        "client never reconnected to second server"
    );

    client.disconnect();
    exit2.store(true, Ordering::Release);
    server2_thread.join().unwrap();
}
