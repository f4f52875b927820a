//! Scripted in-memory adapter for tests and bench setups

use crate::link::SerialLink;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    /// Command (without terminator) -> reply text
    responses: HashMap<String, String>,
    /// Reply used for commands missing from `responses`
    fallback: Option<String>,
    /// Bytes queued for the reader
    pending: VecDeque<u8>,
    /// Partial command being written
    partial: Vec<u8>,
    /// Every complete command received, in order
    commands: Vec<String>,
    /// Never answer (simulates a hung adapter)
    silent: bool,
}

/// Mock ELM327 link.
///
/// Clones share state, so a test can keep one handle for inspection while
/// the session owns the other.
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// Link that answers the standard initialization sequence
    pub fn new() -> Self {
        let link = Self::default();
        link.respond("ATZ", "ELM327 v1.5");
        for cmd in ["ATE0", "ATL0", "ATS0", "ATH1", "ATSTFF", "ATFE"] {
            link.respond(cmd, "OK");
        }
        for n in 0..10 {
            link.respond(&format!("ATSP{n}"), "OK");
        }
        link.respond("ATRV", "12.6V");
        link.fallback("OK");
        link
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    /// Answer `command` with `reply`
    pub fn respond(&self, command: &str, reply: &str) {
        self.lock()
            .responses
            .insert(command.to_string(), reply.to_string());
    }

    /// Answer every unscripted command with `reply`
    pub fn fallback(&self, reply: &str) {
        self.lock().fallback = Some(reply.to_string());
    }

    /// Stop answering anything
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Queue unsolicited bytes that a well-behaved session must discard
    pub fn inject_stale(&self, bytes: &[u8]) {
        self.lock().pending.extend(bytes.iter().copied());
    }

    /// All commands received so far
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Forget the command history
    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Commands received that start with `prefix`
    pub fn commands_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.pending.is_empty() {
            drop(state);
            // A real port blocks for its read timeout before giving up
            std::thread::sleep(std::time::Duration::from_millis(1));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.pending.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        for &byte in buf {
            match byte {
                b'\r' | b'\n' => {
                    if state.partial.is_empty() {
                        continue;
                    }
                    let command = String::from_utf8_lossy(&state.partial).into_owned();
                    state.partial.clear();
                    state.commands.push(command.clone());
                    if state.silent {
                        continue;
                    }
                    let reply = state
                        .responses
                        .get(&command)
                        .or(state.fallback.as_ref())
                        .cloned()
                        .unwrap_or_else(|| "?".to_string());
                    state.pending.extend(reply.replace('\n', "\r").bytes());
                    state.pending.extend(b"\r\r>".iter().copied());
                }
                other => state.partial.push(other),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for MockLink {
    fn discard_input(&mut self) -> io::Result<()> {
        self.lock().pending.clear();
        Ok(())
    }
}
