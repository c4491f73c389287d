//! Framing, dispatch, single-running-command and heartbeat behavior.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use barbot_protocol::{CommandState, Protocol};
use barbot_traits::{BoxError, Clock, Duplex, ManualClock};
use rstest::rstest;

/// In-memory stream: the test pushes request bytes and reads responses.
#[derive(Clone, Default)]
struct TestStream {
    inbox: Rc<RefCell<VecDeque<u8>>>,
    outbox: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
}

impl TestStream {
    fn push(&self, text: &str) {
        self.inbox
            .borrow_mut()
            .extend(text.as_bytes().iter().copied());
    }

    fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut *self.outbox.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Duplex for TestStream {
    fn poll_byte(&mut self) -> Result<Option<u8>, BoxError> {
        if let Some(b) = self.inbox.borrow_mut().pop_front() {
            return Ok(Some(b));
        }
        if self.closed.get() {
            return Err("stream closed".into());
        }
        Ok(None)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        self.outbox.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
}

struct Rig {
    protocol: Protocol<TestStream>,
    stream: TestStream,
    clock: ManualClock,
}

fn rig() -> Rig {
    let stream = TestStream::default();
    let clock = ManualClock::new();
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let mut protocol = Protocol::new(stream.clone(), 300, shared);
    protocol.set_accepts_commands(true);
    // swallow the construction-time STATUS line
    stream.take_output();
    Rig {
        protocol,
        stream,
        clock,
    }
}

/// Do command whose poll yields Running for `ticks` polls, then `end`.
fn scripted_do(ticks: u32, end: CommandState) -> impl FnMut() -> CommandState {
    let mut left = ticks;
    move || {
        if left > 0 {
            left -= 1;
            CommandState::Running
        } else {
            end
        }
    }
}

#[test]
fn set_and_get_answer_immediately() {
    let mut r = rig();
    let speed = Rc::new(Cell::new(0i64));
    {
        let speed = speed.clone();
        r.protocol.add_set_command("SetSpeed", move |params| {
            let v: i64 = params.first()?.parse().ok()?;
            speed.set(v);
            Some(0)
        });
    }
    r.protocol
        .add_get_command("GetWeight", move |_| Some(417));

    r.stream.push("SetSpeed 250.GetWeight.");
    r.protocol.update().unwrap();
    let out = r.stream.take_output();
    assert!(out.contains("ACK SetSpeed\r\n"), "got: {out}");
    assert!(out.contains("ACK GetWeight 417\r\n"), "got: {out}");
    assert_eq!(speed.get(), 250);
}

#[rstest]
#[case("SetSpeed nope.", "NAK SetSpeed")]
#[case("SetSpeed 0.", "NAK SetSpeed")]
#[case("SetSpeed.", "NAK SetSpeed")]
#[case("Bogus 1 2.", "NAK Bogus")]
fn rejected_start_and_unknown_name_both_nak(#[case] input: &str, #[case] expected: &str) {
    let mut r = rig();
    r.protocol.add_set_command("SetSpeed", |params| {
        let v: i64 = params.first()?.parse().ok()?;
        (v > 0).then_some(0)
    });

    r.stream.push(input);
    r.protocol.update().unwrap();
    let out = r.stream.take_output();
    assert!(out.contains(expected), "got: {out}");
}

#[test]
fn do_command_runs_to_done() {
    let mut r = rig();
    let poll = scripted_do(2, CommandState::Done);
    r.protocol.add_do_command("Home", |_| Some(0), poll);

    r.stream.push("Home.");
    r.protocol.update().unwrap();
    assert!(r.stream.take_output().contains("ACK Home"));
    assert_eq!(r.protocol.running_command(), Some("Home"));

    r.protocol.update().unwrap(); // running
    r.protocol.update().unwrap(); // running
    assert_eq!(r.stream.take_output(), "");
    r.protocol.update().unwrap(); // done
    assert!(r.stream.take_output().contains("DONE Home\r\n"));
    assert_eq!(r.protocol.running_command(), None);
}

#[test]
fn do_failure_reports_code_and_value() {
    let mut r = rig();
    let poll = scripted_do(1, CommandState::Failed { code: 33, value: 27 });
    r.protocol.add_do_command("Draft", |_| Some(0), poll);

    r.stream.push("Draft 3 50.");
    r.protocol.update().unwrap();
    r.protocol.update().unwrap();
    r.protocol.update().unwrap();
    let out = r.stream.take_output();
    assert!(out.contains("ERROR Draft 33 27\r\n"), "got: {out}");
}

#[test]
fn second_do_is_dropped_while_one_runs() {
    let mut r = rig();
    let poll = scripted_do(10, CommandState::Done);
    r.protocol.add_do_command("Home", |_| Some(0), poll);
    let move_starts = Rc::new(Cell::new(0u32));
    {
        let move_starts = move_starts.clone();
        let poll2 = scripted_do(0, CommandState::Done);
        r.protocol.add_do_command(
            "Move",
            move |_| {
                move_starts.set(move_starts.get() + 1);
                Some(0)
            },
            poll2,
        );
    }

    r.stream.push("Home.");
    r.protocol.update().unwrap();
    r.stream.take_output();

    // a second Do and even a Get-like line are silently dropped
    r.stream.push("Move 100.GetWeight.");
    r.protocol.update().unwrap();
    assert_eq!(r.stream.take_output(), "");
    assert_eq!(move_starts.get(), 0);
    assert_eq!(r.protocol.running_command(), Some("Home"));
}

#[test]
fn abort_keyword_only_counts_while_running() {
    let mut r = rig();
    let poll = scripted_do(100, CommandState::Done);
    r.protocol.add_do_command("Move", |_| Some(0), poll);

    // no command running: ABORT is just an unknown line
    r.stream.push("ABORT.");
    r.protocol.update().unwrap();
    assert!(!r.protocol.abort_requested());

    r.stream.push("Move 100.");
    r.protocol.update().unwrap();
    r.stream.push("ABORT.");
    r.protocol.update().unwrap();
    assert!(r.protocol.abort_requested());
}

#[test]
fn abort_flag_clears_after_the_command_ends() {
    let mut r = rig();
    let poll = scripted_do(1, CommandState::Failed { code: 41, value: 0 });
    r.protocol.add_do_command("Move", |_| Some(0), poll);

    r.stream.push("Move 10.");
    r.protocol.update().unwrap();
    r.stream.push("ABORT.");
    r.protocol.update().unwrap();
    assert!(r.protocol.abort_requested());

    r.protocol.update().unwrap(); // command fails, slot clears
    r.protocol.update().unwrap(); // abort flag resets with no command running
    assert!(!r.protocol.abort_requested());
}

#[test]
fn gate_drops_lines_until_opened() {
    let stream = TestStream::default();
    let clock = ManualClock::new();
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let mut protocol = Protocol::new(stream.clone(), 300, shared);
    stream.take_output();
    let starts = Rc::new(Cell::new(0u32));
    {
        let starts = starts.clone();
        protocol.add_set_command("SetSpeed", move |_| {
            starts.set(starts.get() + 1);
            Some(0)
        });
    }

    stream.push("SetSpeed 10.");
    protocol.update().unwrap();
    assert_eq!(starts.get(), 0);
    assert_eq!(stream.take_output(), "");

    protocol.set_accepts_commands(true);
    stream.push("SetSpeed 10.");
    protocol.update().unwrap();
    assert_eq!(starts.get(), 1);
}

#[test]
fn framing_handles_cr_lf_backspace_and_blank_lines() {
    let mut r = rig();
    let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = seen.clone();
        r.protocol.add_set_command("SetSpeed", move |params| {
            seen.borrow_mut().push(params.join(","));
            Some(0)
        });
    }

    // CR terminator with ignored LF, backspace repair, empty line, '.' line
    r.stream.push("SetSpeed 10\r\nSetSpeeq\x08d 20.\r\nSetSpeed  30 .");
    r.protocol.update().unwrap();
    let calls = seen.borrow().clone();
    assert_eq!(calls, vec!["10", "20", "30"]);
}

#[test]
fn overlong_lines_are_dropped_whole() {
    let mut r = rig();
    let starts = Rc::new(Cell::new(0u32));
    {
        let starts = starts.clone();
        r.protocol.add_set_command("SetSpeed", move |_| {
            starts.set(starts.get() + 1);
            Some(0)
        });
    }

    let long = "SetSpeed ".to_string() + &"9".repeat(200) + ".";
    r.stream.push(&long);
    r.stream.push("SetSpeed 10.");
    r.protocol.update().unwrap();
    // the oversized line vanished, the following one still dispatched
    assert_eq!(starts.get(), 1);
}

#[test]
fn heartbeat_names_the_running_command_or_idle() {
    let mut r = rig();
    let poll = scripted_do(1000, CommandState::Done);
    r.protocol.add_do_command("Mix", |_| Some(0), poll);

    r.clock.advance_ms(301);
    r.protocol.update().unwrap();
    assert!(r.stream.take_output().contains("STATUS IDLE\r\n"));

    r.stream.push("Mix 10.");
    r.protocol.update().unwrap();
    r.stream.take_output();
    r.clock.advance_ms(301);
    r.protocol.update().unwrap();
    assert!(r.stream.take_output().contains("STATUS Mix\r\n"));
}

#[test]
fn stream_error_is_reported_but_polling_continues() {
    let mut r = rig();
    let poll = scripted_do(1, CommandState::Done);
    r.protocol.add_do_command("Home", |_| Some(0), poll);
    r.stream.push("Home.");
    r.protocol.update().unwrap();
    r.stream.take_output();

    r.stream.closed.set(true);
    assert!(r.protocol.update().is_err());
    // the running command still completed on the next tick
    assert!(r.protocol.update().is_err());
    assert!(r.stream.take_output().contains("DONE Home"));
}
