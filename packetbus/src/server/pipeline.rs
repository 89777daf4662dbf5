use std::collections::HashMap;
use std::net::Shutdown;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use packetbus_queue::BoundedQueue;

use crate::roster::ClientRoster;
use crate::server::conn::{ReadOutcome, RxAccumulator};
use crate::server::tasks::{Destination, RecvTask, SendTask};
use crate::server::ServerConfig;
use crate::wire::{self, CipherPair, TARGET_LEN};
use crate::ServerError;

const LISTENER: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

use crate::net_util::send_no_sigpipe;

/// Callback invoked once per successfully parsed inbound message.
pub type OnMessage<Ctx> =
    dyn Fn(&ServerHandle, Token, &Ctx, &[u8; TARGET_LEN], &[u8]) + Send + Sync;

/// A cheap, cloneable capability handle for sending, broadcasting, and
/// inspecting a running [`Server`] from any thread, including from inside
/// the server's own message callback.
#[derive(Clone)]
pub struct ServerHandle {
    send_queue: Arc<BoundedQueue<SendTask>>,
    roster: Arc<ClientRoster>,
    running: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Enqueues a unicast send. Returns `false` if the pipeline isn't
    /// running or the send queue is full.
    pub fn send(&self, conn: Token, target: &[u8], body: &[u8]) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.send_queue.enqueue(SendTask {
            destination: Destination::Unicast(conn),
            target: pad_target(target),
            body: body.to_vec(),
        })
    }

    /// Enqueues a broadcast send. Returns `false` if the pipeline isn't
    /// running or the send queue is full.
    pub fn broadcast(&self, target: &[u8], body: &[u8]) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.send_queue.enqueue(SendTask {
            destination: Destination::Broadcast,
            target: pad_target(target),
            body: body.to_vec(),
        })
    }

    pub fn client_count(&self) -> usize {
        self.roster.count()
    }

    /// Requests shutdown; `Server::run` will observe this on its next poll
    /// iteration and tear the pipeline down.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }
}

fn pad_target(target: &[u8]) -> [u8; TARGET_LEN] {
    let mut out = [0u8; TARGET_LEN];
    let n = target.len().min(TARGET_LEN);
    out[..n].copy_from_slice(&target[..n]);
    out
}

struct Connection {
    stream: TcpStream,
    rx: RxAccumulator,
}

/// The TCP server pipeline: a non-blocking accept/read loop on the caller's
/// thread, an N-worker pool parsing and dispatching received frames, and a
/// single sender thread serializing and writing outbound frames.
pub struct Server<Ctx: Send + Sync + 'static> {
    listener: TcpListener,
    poll: Poll,
    config: ServerConfig,
    roster: Arc<ClientRoster>,
    recv_queue: Arc<BoundedQueue<RecvTask>>,
    send_queue: Arc<BoundedQueue<SendTask>>,
    cipher: Arc<Mutex<CipherPair>>,
    running: Arc<AtomicBool>,
    callback: Arc<OnMessage<Ctx>>,
    service_ctx: Arc<Ctx>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl<Ctx: Send + Sync + 'static> Server<Ctx> {
    /// Binds and listens on `port`, ready for [`run`](Self::run).
    pub fn bind(
        port: u16,
        config: ServerConfig,
        callback: impl Fn(&ServerHandle, Token, &Ctx, &[u8; TARGET_LEN], &[u8]) + Send + Sync + 'static,
        service_ctx: Ctx,
    ) -> Result<Self, ServerError> {
        let addr = format!("0.0.0.0:{port}").parse().unwrap();
        let mut listener = TcpListener::bind(addr).map_err(ServerError::Bind)?;
        let poll = Poll::new().map_err(ServerError::Register)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Register)?;

        Ok(Self {
            listener,
            poll,
            roster: Arc::new(ClientRoster::new()),
            recv_queue: Arc::new(BoundedQueue::new(config.queue_capacity)),
            send_queue: Arc::new(BoundedQueue::new(config.queue_capacity)),
            cipher: Arc::new(Mutex::new(CipherPair::XOR)),
            running: Arc::new(AtomicBool::new(true)),
            callback: Arc::new(callback),
            service_ctx: Arc::new(service_ctx),
            connections: HashMap::new(),
            next_token: 1,
            config,
        })
    }

    /// A cheap, cloneable handle usable from any thread, including from
    /// inside the message callback itself.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            send_queue: Arc::clone(&self.send_queue),
            roster: Arc::clone(&self.roster),
            running: Arc::clone(&self.running),
        }
    }

    pub fn send(&self, conn: Token, target: &[u8], body: &[u8]) -> bool {
        self.handle().send(conn, target, body)
    }

    pub fn broadcast(&self, target: &[u8], body: &[u8]) -> bool {
        self.handle().broadcast(target, body)
    }

    pub fn client_count(&self) -> usize {
        self.roster.count()
    }

    /// The address the listener is bound to, useful to discover the
    /// actual port when `bind` was called with port `0`.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Replaces the codec pair used for subsequent serialize/parse
    /// operations. Not synchronized with in-flight tasks: a task already
    /// queued may be processed under the old or new strategy.
    pub fn set_strategy(&self, pair: CipherPair) {
        *self.cipher.lock().unwrap() = pair;
    }

    /// Runs the accept/read loop on the caller's thread until `exit_flag`
    /// is set or the pipeline is shut down via a [`ServerHandle`]. Spawns
    /// the worker pool and sender thread up front and tears the whole
    /// pipeline down, including joining every thread, before returning.
    pub fn run(mut self, exit_flag: &AtomicBool) {
        let workers: Vec<JoinHandle<()>> = (0..self.config.worker_count)
            .map(|id| {
                let recv_queue = Arc::clone(&self.recv_queue);
                let cipher = Arc::clone(&self.cipher);
                let callback = Arc::clone(&self.callback);
                let service_ctx = Arc::clone(&self.service_ctx);
                let handle = self.handle();
                thread::Builder::new()
                    .name(format!("packetbus-worker-{id}"))
                    .spawn(move || worker_loop(recv_queue, cipher, callback, service_ctx, handle))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        let sender = {
            let send_queue = Arc::clone(&self.send_queue);
            let cipher = Arc::clone(&self.cipher);
            let roster = Arc::clone(&self.roster);
            let recv_buf_size = self.config.recv_buf_size;
            thread::Builder::new()
                .name("packetbus-sender".into())
                .spawn(move || sender_loop(send_queue, cipher, roster, recv_buf_size))
                .expect("failed to spawn sender thread")
        };

        self.accept_loop(exit_flag);

        self.running.store(false, Ordering::Release);
        self.recv_queue.close();
        self.send_queue.close();
        for worker in workers {
            let _ = worker.join();
        }
        let _ = sender.join();

        for (_, conn) in self.connections.drain() {
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
        self.roster.clear();
        info!("server pipeline shut down");
    }

    fn accept_loop(&mut self, exit_flag: &AtomicBool) {
        let mut events = Events::with_capacity(128);
        while self.running.load(Ordering::Acquire) && !exit_flag.load(Ordering::Acquire) {
            if let Err(err) = self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(?err, "server: poll failed");
                break;
            }

            for event in events.iter() {
                if event.token() == LISTENER {
                    self.accept_all();
                } else {
                    self.read_ready(event.token());
                }
            }
        }
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer_addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(err) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!(?err, "server: couldn't register accepted connection");
                        continue;
                    }
                    let fd = stream.as_raw_fd();
                    self.roster.add(token, fd);
                    self.send_handshake(&stream);
                    self.connections.insert(
                        token,
                        Connection {
                            stream,
                            rx: RxAccumulator::new(),
                        },
                    );
                    debug!(?peer_addr, ?token, "server: client connected");
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(?err, "server: accept failed");
                    break;
                }
            }
        }
    }

    fn send_handshake(&self, stream: &TcpStream) {
        let strategy_code = self.cipher.lock().unwrap().strategy_code().to_be_bytes();
        let mut out = Vec::new();
        if wire::serialize(
            &mut out,
            b"SEC_ARG",
            &strategy_code,
            self.config.recv_buf_size,
            None,
        )
        .is_err()
        {
            warn!("server: handshake frame too large for configured buffer size");
            return;
        }
        if let Err(err) = send_no_sigpipe(stream.as_raw_fd(), &out) {
            warn!(?err, "server: failed to send handshake");
        }
    }

    fn read_ready(&mut self, token: Token) {
        let max_buf_size = self.config.recv_buf_size;
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        loop {
            match conn.rx.read_frame(&mut conn.stream, max_buf_size) {
                ReadOutcome::FrameReady(frame) => {
                    if !self.recv_queue.enqueue(RecvTask { conn: token, frame }) {
                        warn!(?token, "server: recv queue full, dropping frame");
                    }
                }
                ReadOutcome::WouldBlock => return,
                ReadOutcome::Disconnected => {
                    self.close_connection(token);
                    return;
                }
            }
        }
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
        self.roster.remove(token);
        debug!(?token, "server: client disconnected");
    }
}

fn worker_loop<Ctx>(
    recv_queue: Arc<BoundedQueue<RecvTask>>,
    cipher: Arc<Mutex<CipherPair>>,
    callback: Arc<OnMessage<Ctx>>,
    service_ctx: Arc<Ctx>,
    handle: ServerHandle,
) {
    loop {
        let task = match recv_queue.dequeue() {
            Ok(task) => task,
            Err(_closed) => return,
        };
        let mut frame = task.frame;
        let decrypt = cipher.lock().unwrap().decrypt;
        match wire::parse(&mut frame, decrypt) {
            Ok(parsed) => callback(&handle, task.conn, &service_ctx, &parsed.target, parsed.body),
            Err(err) => debug!(?err, conn = ?task.conn, "server: dropping unparsable frame"),
        }
    }
}

fn sender_loop(
    send_queue: Arc<BoundedQueue<SendTask>>,
    cipher: Arc<Mutex<CipherPair>>,
    roster: Arc<ClientRoster>,
    max_buf_size: usize,
) {
    let mut scratch = Vec::new();
    loop {
        let task = match send_queue.dequeue() {
            Ok(task) => task,
            Err(_closed) => return,
        };
        let encrypt = cipher.lock().unwrap().encrypt;
        if wire::serialize(
            &mut scratch,
            &task.target,
            &task.body,
            max_buf_size,
            encrypt,
        )
        .is_err()
        {
            warn!("server: outbound frame too large, dropping");
            continue;
        }

        match task.destination {
            Destination::Unicast(token) => {
                if let Some(fd) = roster.fd_of(token) {
                    if let Err(err) = send_no_sigpipe(fd, &scratch) {
                        debug!(?err, ?token, "server: unicast write failed");
                    }
                }
            }
            Destination::Broadcast => {
                roster.for_each(|token, fd| {
                    if let Err(err) = send_no_sigpipe(fd, &scratch) {
                        debug!(?err, ?token, "server: broadcast write failed");
                    }
                });
            }
        }
    }
}
