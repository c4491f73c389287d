#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Line-oriented command protocol: registry and dispatcher.
//!
//! Requests arrive as `<Name> <p1> <p2> ...` terminated by `.` or CR over a
//! non-blocking [`Duplex`] stream. Responses are `ACK`/`NAK`/`DONE`/`ERROR`
//! plus an unsolicited `STATUS` heartbeat. At most one `Do` command runs at a
//! time; while one is outstanding only the reserved abort keyword is honored
//! and every other line is dropped.

mod command;

pub use command::{CommandKind, CommandState, PollFn, StartFn};

use std::sync::Arc;
use std::time::Instant;

use barbot_traits::{Clock, Duplex};
use thiserror::Error;

use command::Command;

/// Reserved control token, only accepted while a `Do` command is running.
pub const ABORT_KEYWORD: &str = "ABORT";

/// Line buffer bound; bytes beyond this are dropped until the terminator.
pub const MAX_LINE_BYTES: usize = 60;
/// At most this many parameters are kept per command line.
pub const MAX_PARAMS: usize = 8;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The underlying stream is gone; the dispatcher cannot continue.
    #[error("command stream closed: {0}")]
    StreamClosed(String),
}

pub struct Protocol<S: Duplex> {
    stream: S,
    commands: Vec<Command>,
    /// Index of the single running `Do` command, if any.
    running: Option<usize>,
    line: Vec<u8>,
    /// Set while the line buffer overflowed; cleared at the next terminator.
    overflowed: bool,
    accepts_commands: bool,
    abort: bool,
    heartbeat_ms: u64,
    last_send_ms: u64,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl<S: Duplex> Protocol<S> {
    /// Construct over a stream and announce ourselves with a STATUS line.
    pub fn new(stream: S, heartbeat_ms: u64, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        let mut p = Self {
            stream,
            commands: Vec::new(),
            running: None,
            line: Vec::with_capacity(MAX_LINE_BYTES),
            overflowed: false,
            accepts_commands: false,
            abort: false,
            heartbeat_ms: heartbeat_ms.max(1),
            last_send_ms: 0,
            clock,
            epoch,
        };
        p.send_status();
        p
    }

    // ── registration ────────────────────────────────────────────────────────

    pub fn add_set_command(
        &mut self,
        name: &'static str,
        start: impl FnMut(&[&str]) -> Option<i64> + 'static,
    ) {
        self.add(name, CommandKind::Set, Box::new(start), None);
    }

    pub fn add_get_command(
        &mut self,
        name: &'static str,
        start: impl FnMut(&[&str]) -> Option<i64> + 'static,
    ) {
        self.add(name, CommandKind::Get, Box::new(start), None);
    }

    pub fn add_do_command(
        &mut self,
        name: &'static str,
        start: impl FnMut(&[&str]) -> Option<i64> + 'static,
        poll: impl FnMut() -> CommandState + 'static,
    ) {
        self.add(name, CommandKind::Do, Box::new(start), Some(Box::new(poll)));
    }

    fn add(&mut self, name: &'static str, kind: CommandKind, start: StartFn, poll: Option<PollFn>) {
        debug_assert!(
            self.commands.iter().all(|c| c.name != name),
            "duplicate command name {name}"
        );
        self.commands.push(Command {
            name,
            kind,
            start,
            poll,
        });
    }

    // ── state ───────────────────────────────────────────────────────────────

    pub fn accepts_commands(&self) -> bool {
        self.accepts_commands
    }

    /// Gate command processing; dispatch stays off until the machine has
    /// finished its startup homing.
    pub fn set_accepts_commands(&mut self, accept: bool) {
        self.accepts_commands = accept;
    }

    /// True once the abort keyword arrived for the currently running command.
    pub fn abort_requested(&self) -> bool {
        self.abort
    }

    /// Name of the running `Do` command, if any.
    pub fn running_command(&self) -> Option<&'static str> {
        self.running.map(|i| self.commands[i].name)
    }

    // ── tick ────────────────────────────────────────────────────────────────

    /// Service the protocol: poll the running command, drain input, emit the
    /// heartbeat. Returns `Err` only when the stream itself is gone; a
    /// running command keeps being polled by further calls even then.
    pub fn update(&mut self) -> Result<(), ProtocolError> {
        self.poll_running();
        if self.running.is_none() {
            // the abort flag only has meaning while a command runs
            self.abort = false;
        }

        let drained = self.drain_input();

        if self.now_ms() > self.last_send_ms + self.heartbeat_ms {
            self.send_status();
        }
        drained
    }

    fn poll_running(&mut self) {
        let Some(idx) = self.running else { return };
        let state = match self.commands[idx].poll.as_mut() {
            Some(poll) => poll(),
            None => CommandState::Done,
        };
        match state {
            CommandState::Running => {}
            CommandState::Done => {
                let name = self.commands[idx].name;
                self.send_line(&format!("DONE {name}"));
                self.running = None;
            }
            CommandState::Failed { code, value } => {
                let name = self.commands[idx].name;
                self.send_line(&format!("ERROR {name} {code} {value}"));
                self.running = None;
            }
        }
    }

    fn drain_input(&mut self) -> Result<(), ProtocolError> {
        loop {
            let byte = match self.stream.poll_byte() {
                Ok(Some(b)) => b,
                Ok(None) => return Ok(()),
                Err(e) => return Err(ProtocolError::StreamClosed(e.to_string())),
            };
            match byte {
                b'.' | b'\r' => {
                    let truncated = self.overflowed;
                    self.overflowed = false;
                    let raw = std::mem::take(&mut self.line);
                    if truncated {
                        tracing::warn!(len = raw.len(), "dropping overlong command line");
                        continue;
                    }
                    let text = String::from_utf8_lossy(&raw).into_owned();
                    self.process(&text);
                }
                // newlines usually pair with the CR we use for detection
                b'\n' => {}
                0x08 => {
                    self.line.pop();
                }
                other => {
                    if self.line.len() < MAX_LINE_BYTES {
                        self.line.push(other);
                    } else {
                        self.overflowed = true;
                    }
                }
            }
        }
    }

    fn process(&mut self, text: &str) {
        let mut tokens = text.split(' ').filter(|t| !t.is_empty());
        let Some(name) = tokens.next() else { return };
        let params: Vec<&str> = tokens.take(MAX_PARAMS).collect();

        if !self.accepts_commands {
            return;
        }
        if self.running.is_some() {
            // only the abort keyword gets through; everything else is dropped
            if name == ABORT_KEYWORD {
                self.abort = true;
            }
            return;
        }

        let Some(idx) = self.commands.iter().position(|c| c.name == name) else {
            self.send_line(&format!("NAK {name}"));
            return;
        };
        let result = (self.commands[idx].start)(&params);
        let cmd_name = self.commands[idx].name;
        match result {
            None => self.send_line(&format!("NAK {cmd_name}")),
            Some(value) => match self.commands[idx].kind {
                CommandKind::Get => self.send_line(&format!("ACK {cmd_name} {value}")),
                CommandKind::Set => self.send_line(&format!("ACK {cmd_name}")),
                CommandKind::Do => {
                    self.send_line(&format!("ACK {cmd_name}"));
                    if self.commands[idx].poll.is_some() {
                        self.running = Some(idx);
                    }
                }
            },
        }
    }

    fn send_status(&mut self) {
        let line = match self.running_command() {
            Some(name) => format!("STATUS {name}"),
            None => "STATUS IDLE".to_string(),
        };
        self.send_line(&line);
    }

    /// Best-effort send; a failed write is logged, not fatal, since the
    /// stream error will surface through `poll_byte` anyway.
    fn send_line(&mut self, line: &str) {
        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        if let Err(e) = self.stream.send(&bytes) {
            tracing::warn!(error = %e, line, "protocol send failed");
        }
        self.last_send_ms = self.now_ms();
    }

    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }
}
