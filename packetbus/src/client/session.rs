use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::client::ClientConfig;
use crate::net_util::send_no_sigpipe;
use crate::wire::{self, CipherPair, CHECKSUM_LEN, HEADER_SIZE, TARGET_LEN};
use crate::SendError;

/// Callback invoked once per successfully parsed inbound message.
pub type OnMessage<Ctx> = dyn Fn(&ClientHandle, &Ctx, &[u8; TARGET_LEN], &[u8]) + Send + Sync;

const HANDSHAKE_TARGET: &[u8; TARGET_LEN] = b"SEC_ARG\0";

/// A cheap, cloneable capability handle for sending and inspecting a
/// [`ClientSession`] from any thread, including from inside its own
/// message callback.
#[derive(Clone)]
pub struct ClientHandle {
    write_socket: Arc<Mutex<Option<TcpStream>>>,
    cipher: Arc<Mutex<CipherPair>>,
    connected: Arc<AtomicBool>,
    recv_buf_size: usize,
}

impl ClientHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Serializes and writes one frame. Does not retry.
    pub fn send(&self, target: &[u8], body: &[u8]) -> Result<usize, SendError> {
        let guard = self.write_socket.lock().unwrap();
        let stream = guard.as_ref().ok_or(SendError::NotConnected)?;
        let encrypt = self.cipher.lock().unwrap().encrypt;
        let mut out = Vec::new();
        wire::serialize(&mut out, target, body, self.recv_buf_size, encrypt)
            .map_err(|_| SendError::FrameTooLarge)?;
        send_no_sigpipe(std::os::fd::AsRawFd::as_raw_fd(stream), &out).map_err(SendError::Io)
    }

    /// Closes the current socket (if any) and re-arms the default cipher.
    /// Idempotent.
    pub fn reset_connection(&self) {
        if let Some(stream) = self.write_socket.lock().unwrap().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.connected.store(false, Ordering::Release);
        *self.cipher.lock().unwrap() = CipherPair::XOR;
    }
}

/// Connect/handshake/receive-loop client state machine with automatic
/// reconnect.
pub struct ClientSession<Ctx: Send + Sync + 'static> {
    config: ClientConfig,
    on_message: Arc<OnMessage<Ctx>>,
    service_ctx: Arc<Ctx>,
    cipher: Arc<Mutex<CipherPair>>,
    write_socket: Arc<Mutex<Option<TcpStream>>>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    network_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<Ctx: Send + Sync + 'static> ClientSession<Ctx> {
    pub fn new(
        on_message: impl Fn(&ClientHandle, &Ctx, &[u8; TARGET_LEN], &[u8]) + Send + Sync + 'static,
        service_ctx: Ctx,
        config: ClientConfig,
    ) -> Self {
        Self {
            config,
            on_message: Arc::new(on_message),
            service_ctx: Arc::new(service_ctx),
            cipher: Arc::new(Mutex::new(CipherPair::XOR)),
            write_socket: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            network_thread: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            write_socket: Arc::clone(&self.write_socket),
            cipher: Arc::clone(&self.cipher),
            connected: Arc::clone(&self.connected),
            recv_buf_size: self.config.recv_buf_size,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn send(&self, target: &[u8], body: &[u8]) -> Result<usize, SendError> {
        self.handle().send(target, body)
    }

    pub fn set_strategy(&self, pair: CipherPair) {
        *self.cipher.lock().unwrap() = pair;
    }

    pub fn reset_connection(&self) {
        self.handle().reset_connection();
    }

    /// Spawns the network thread, which drives connect → handshake →
    /// receive-loop, reconnecting on failure, until [`disconnect`](Self::disconnect)
    /// is called. Returns immediately.
    pub fn connect(&self, addr: SocketAddr) {
        self.running.store(true, Ordering::Release);
        let on_message = Arc::clone(&self.on_message);
        let service_ctx = Arc::clone(&self.service_ctx);
        let cipher = Arc::clone(&self.cipher);
        let write_socket = Arc::clone(&self.write_socket);
        let running = Arc::clone(&self.running);
        let connected = Arc::clone(&self.connected);
        let config = self.config.clone();

        let thread = thread::Builder::new()
            .name("packetbus-client".into())
            .spawn(move || {
                network_loop(
                    addr,
                    &on_message,
                    &service_ctx,
                    &cipher,
                    &write_socket,
                    &running,
                    &connected,
                    &config,
                );
            })
            .expect("failed to spawn client network thread");
        *self.network_thread.lock().unwrap() = Some(thread);
    }

    /// Stops the network thread and closes the current socket, if any.
    pub fn disconnect(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(stream) = self.write_socket.lock().unwrap().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.connected.store(false, Ordering::Release);
        if let Some(thread) = self.network_thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }
}

impl<Ctx: Send + Sync + 'static> Drop for ClientSession<Ctx> {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            self.disconnect();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn network_loop<Ctx>(
    addr: SocketAddr,
    on_message: &Arc<OnMessage<Ctx>>,
    service_ctx: &Arc<Ctx>,
    cipher: &Arc<Mutex<CipherPair>>,
    write_socket: &Arc<Mutex<Option<TcpStream>>>,
    running: &Arc<AtomicBool>,
    connected: &Arc<AtomicBool>,
    config: &ClientConfig,
) {
    while running.load(Ordering::Acquire) {
        let mut stream = match TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(err) => {
                debug!(?err, ?addr, "client: connect failed, retrying");
                thread::sleep(config.reconnect_interval);
                continue;
            }
        };

        if let Err(err) = perform_handshake(&mut stream, cipher) {
            debug!(?err, "client: handshake failed, retrying");
            let _ = stream.shutdown(Shutdown::Both);
            thread::sleep(config.reconnect_interval);
            continue;
        }

        let write_clone = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                warn!(?err, "client: failed to clone socket for writer");
                thread::sleep(config.reconnect_interval);
                continue;
            }
        };
        *write_socket.lock().unwrap() = Some(write_clone);
        connected.store(true, Ordering::Release);
        debug!(?addr, "client: connected");

        while running.load(Ordering::Acquire) {
            match read_one_frame(&mut stream, cipher, config.recv_buf_size) {
                Some((target, body)) => {
                    let handle = ClientHandle {
                        write_socket: Arc::clone(write_socket),
                        cipher: Arc::clone(cipher),
                        connected: Arc::clone(connected),
                        recv_buf_size: config.recv_buf_size,
                    };
                    on_message(&handle, service_ctx, &target, &body);
                }
                None => break,
            }
        }

        if let Some(stream) = write_socket.lock().unwrap().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        connected.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
enum HandshakeError {
    Io(std::io::Error),
    Protocol,
}

impl From<std::io::Error> for HandshakeError {
    fn from(err: std::io::Error) -> Self {
        HandshakeError::Io(err)
    }
}

fn perform_handshake(
    stream: &mut TcpStream,
    cipher: &Arc<Mutex<CipherPair>>,
) -> Result<(), HandshakeError> {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header)?;
    let total_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if total_len < HEADER_SIZE + CHECKSUM_LEN || total_len > 64 {
        return Err(HandshakeError::Protocol);
    }
    let mut full = header.to_vec();
    full.resize(total_len, 0);
    stream.read_exact(&mut full[HEADER_SIZE..])?;

    let parsed = wire::parse(&mut full, None).map_err(|_| HandshakeError::Protocol)?;
    if &parsed.target != HANDSHAKE_TARGET {
        return Err(HandshakeError::Protocol);
    }
    if parsed.body.len() != 4 {
        return Err(HandshakeError::Protocol);
    }
    let strategy_code =
        i32::from_be_bytes([parsed.body[0], parsed.body[1], parsed.body[2], parsed.body[3]]);
    *cipher.lock().unwrap() = CipherPair::for_strategy_code(strategy_code);
    Ok(())
}

/// Reads one frame from the connected-phase receive loop. Returns `None` on
/// any read or protocol error, signaling the caller to tear down and
/// reconnect.
fn read_one_frame(
    stream: &mut TcpStream,
    cipher: &Arc<Mutex<CipherPair>>,
    max_buf_size: usize,
) -> Option<([u8; TARGET_LEN], Vec<u8>)> {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).ok()?;
    let total_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if total_len < HEADER_SIZE + CHECKSUM_LEN || total_len > max_buf_size {
        return None;
    }
    let mut full = header.to_vec();
    full.resize(total_len, 0);
    stream.read_exact(&mut full[HEADER_SIZE..]).ok()?;

    let decrypt = cipher.lock().unwrap().decrypt;
    match wire::parse(&mut full, decrypt) {
        Ok(parsed) => Some((parsed.target, parsed.body.to_vec())),
        Err(err) => {
            debug!(?err, "client: dropping unparsable frame, resyncing");
            None
        }
    }
}
