//! Round-trip property: every dispatched line yields exactly one terminal
//! response while no Do command is outstanding.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use barbot_protocol::Protocol;
use barbot_traits::{BoxError, Clock, Duplex, ManualClock};
use proptest::prelude::*;

#[derive(Clone, Default)]
struct TestStream {
    inbox: Rc<RefCell<VecDeque<u8>>>,
    outbox: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
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

fn terminal_responses(output: &str) -> usize {
    output
        .lines()
        .filter(|l| {
            l.starts_with("ACK ")
                || l.starts_with("NAK ")
                || l.starts_with("DONE ")
                || l.starts_with("ERROR ")
        })
        .count()
}

proptest! {
    #[test]
    fn one_terminal_response_per_request(
        requests in prop::collection::vec(
            ("[A-Za-z]{1,10}", prop::collection::vec("[0-9]{1,4}", 0..3)),
            1..20,
        )
    ) {
        let stream = TestStream::default();
        let clock = ManualClock::new();
        let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
        let mut protocol = Protocol::new(stream.clone(), 300, shared);
        protocol.set_accepts_commands(true);
        stream.outbox.borrow_mut().clear();

        // a permissive Set, a Get, and a picky Set
        protocol.add_set_command("Alpha", |_| Some(0));
        protocol.add_get_command("Beta", |_| Some(7));
        protocol.add_set_command("Gamma", |params| {
            let v: i64 = params.first()?.parse().ok()?;
            (v > 0).then_some(0)
        });

        for (name, params) in &requests {
            let mut line = name.clone();
            for p in params {
                line.push(' ');
                line.push_str(p);
            }
            line.push('.');
            stream.inbox.borrow_mut().extend(line.bytes());
            protocol.update().unwrap();

            let output = {
                let bytes = std::mem::take(&mut *stream.outbox.borrow_mut());
                String::from_utf8_lossy(&bytes).into_owned()
            };
            prop_assert_eq!(
                terminal_responses(&output),
                1,
                "request {:?} produced: {:?}",
                line,
                output
            );
        }
    }
}
