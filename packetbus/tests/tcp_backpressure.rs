use packetbus::{Server, ServerConfig};

/// When the send queue is full (no sender thread running to drain it), a
/// further `send`/`broadcast` must fail rather than block or panic, and
/// earlier-queued tasks must remain unaffected.
#[test]
fn send_queue_rejects_once_full_without_blocking() {
    let server = Server::bind(
        0,
        ServerConfig::new().with_queue_capacity(4),
        |_, _, _: &(), _, _| {},
        (),
    )
    .unwrap();
    let handle = server.handle();

    // `server.run` is never called, so nothing drains the send queue: this
    // deterministically exercises the full-queue path instead of racing a
    // consumer thread.
    for _ in 0..4 {
        assert!(handle.broadcast(b"CHAT", b"x"));
    }
    assert!(!handle.broadcast(b"CHAT", b"overflow"));

    // Dropping `server` un-run tears down the listener and queues through
    // ordinary ownership; no explicit cleanup is required.
    drop(server);
}
