// SPDX-License-Identifier: MIT
//
// In-memory terminal for tests.
//
// `FakeTty` is a cheap handle onto shared state, so a test can hand one
// clone to a session and keep another to inspect what the session did
// after it has been released or dropped.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::attrs::Attributes;
use crate::session::Tty;

/// One step of scripted input.
#[derive(Debug)]
enum Chunk {
    Bytes(Vec<u8>),
    /// A read that returns this error kind once.
    Error(io::ErrorKind),
}

#[derive(Debug)]
struct State {
    terminal: bool,
    current: Attributes,
    writes: Vec<Attributes>,
    armed: Option<Attributes>,
    /// Whether the restore hook was armed when the first write happened.
    armed_before_first_write: Option<bool>,
    fail_get: bool,
    failing_sets: usize,
    input: VecDeque<Chunk>,
}

/// A terminal device backed by memory.
#[derive(Debug, Clone)]
pub struct FakeTty {
    state: Arc<Mutex<State>>,
}

impl FakeTty {
    /// A terminal currently configured with `attrs`.
    pub fn new(attrs: Attributes) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                terminal: true,
                current: attrs,
                writes: Vec::new(),
                armed: None,
                armed_before_first_write: None,
                fail_get: false,
                failing_sets: 0,
                input: VecDeque::new(),
            })),
        }
    }

    /// A device that is not a terminal (a pipe, a file).
    pub fn not_a_terminal() -> Self {
        let tty = Self::new(crate::attrs::cooked());
        tty.lock().terminal = false;
        tty
    }

    /// Queue bytes to be returned by reads, one chunk per `read()` call
    /// at most. Once the queue is empty every read returns 0 (a timeout).
    #[must_use]
    pub fn with_input(self, bytes: &[u8]) -> Self {
        self.push_input(bytes);
        self
    }

    pub fn push_input(&self, bytes: &[u8]) {
        self.lock().input.push_back(Chunk::Bytes(bytes.to_vec()));
    }

    /// Queue a read that fails with `kind`.
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.lock().input.push_back(Chunk::Error(kind));
    }

    pub fn fail_get(&self) {
        self.lock().fail_get = true;
    }

    /// Make the next `n` attribute writes fail.
    pub fn fail_next_sets(&self, n: usize) {
        self.lock().failing_sets = n;
    }

    pub fn current(&self) -> Attributes {
        self.lock().current
    }

    /// Every attribute write attempted, failed ones included.
    pub fn writes(&self) -> Vec<Attributes> {
        self.lock().writes.clone()
    }

    pub fn armed(&self) -> Option<Attributes> {
        self.lock().armed
    }

    pub fn armed_before_first_write(&self) -> Option<bool> {
        self.lock().armed_before_first_write
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Tty for FakeTty {
    fn is_terminal(&self) -> bool {
        self.lock().terminal
    }

    fn get_attributes(&self) -> io::Result<Attributes> {
        let state = self.lock();
        if state.fail_get {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(state.current)
    }

    fn set_attributes(&mut self, attrs: &Attributes) -> io::Result<()> {
        let mut state = self.lock();
        state.writes.push(*attrs);
        if state.armed_before_first_write.is_none() {
            state.armed_before_first_write = Some(state.armed.is_some());
        }
        if state.failing_sets > 0 {
            state.failing_sets -= 1;
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        state.current = *attrs;
        Ok(())
    }

    fn arm_restore(&mut self, original: &Attributes) {
        self.lock().armed = Some(*original);
    }

    fn disarm_restore(&mut self) {
        self.lock().armed = None;
    }
}

impl Read for FakeTty {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        match state.input.pop_front() {
            None => Ok(0),
            Some(Chunk::Error(kind)) => Err(io::Error::from(kind)),
            Some(Chunk::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    state.input.push_front(Chunk::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}
