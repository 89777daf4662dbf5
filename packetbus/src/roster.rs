//! Thread-safe membership of currently connected server-side clients.
//!
//! The roster only tracks the raw socket descriptor needed to write to a
//! connection; the non-blocking `mio::net::TcpStream` used for reading is
//! owned exclusively by the accept/read thread. A single fd safely serves
//! independent `recv`/`send` syscalls from different threads, so the sender
//! thread writes directly against the fd recorded here without touching the
//! read thread's stream.

use std::os::fd::RawFd;
use std::sync::Mutex;

use mio::Token;

pub struct ClientRoster {
    clients: Mutex<Vec<(Token, RawFd)>>,
}

impl ClientRoster {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, token: Token, fd: RawFd) {
        self.clients.lock().unwrap().push((token, fd));
    }

    pub fn remove(&self, token: Token) {
        self.clients.lock().unwrap().retain(|(t, _)| *t != token);
    }

    /// Runs `f` once per currently connected client under the roster lock,
    /// giving callers (the sender thread's broadcast path) a consistent
    /// snapshot of membership for the duration of the call.
    pub fn for_each(&self, mut f: impl FnMut(Token, RawFd)) {
        let clients = self.clients.lock().unwrap();
        for (token, fd) in clients.iter() {
            f(*token, *fd);
        }
    }

    pub fn fd_of(&self, token: Token) -> Option<RawFd> {
        self.clients
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, fd)| *fd)
    }

    pub fn count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.clients.lock().unwrap().clear();
    }
}

impl Default for ClientRoster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_remove_and_count() {
        let roster = ClientRoster::new();
        roster.add(Token(1), 10);
        roster.add(Token(2), 11);
        assert_eq!(roster.count(), 2);
        roster.remove(Token(1));
        assert_eq!(roster.count(), 1);
        assert_eq!(roster.fd_of(Token(2)), Some(11));
        assert_eq!(roster.fd_of(Token(1)), None);
    }

    #[test]
    fn for_each_sees_consistent_snapshot() {
        let roster = ClientRoster::new();
        roster.add(Token(1), 10);
        roster.add(Token(2), 11);
        let mut seen = Vec::new();
        roster.for_each(|token, fd| seen.push((token, fd)));
        assert_eq!(seen, vec![(Token(1), 10), (Token(2), 11)]);
    }
}
