#![no_main]
use libfuzzer_sys::fuzz_target;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use barbot_protocol::{CommandState, Protocol};
use barbot_traits::{BoxError, Clock, Duplex, MonotonicClock};

#[derive(Clone, Default)]
struct FuzzStream {
    inbox: Rc<RefCell<VecDeque<u8>>>,
}

impl Duplex for FuzzStream {
    fn poll_byte(&mut self) -> Result<Option<u8>, BoxError> {
        Ok(self.inbox.borrow_mut().pop_front())
    }
    fn send(&mut self, _bytes: &[u8]) -> Result<(), BoxError> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    // Arbitrary byte soup through framing, tokenizing and dispatch must not
    // panic or leave the dispatcher wedged.
    let stream = FuzzStream::default();
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let mut protocol = Protocol::new(stream.clone(), 300, clock);
    protocol.set_accepts_commands(true);
    protocol.add_set_command("SetSpeed", |params| {
        let v: i64 = params.first()?.parse().ok()?;
        (v > 0).then_some(0)
    });
    protocol.add_get_command("GetWeight", |_| Some(42));
    protocol.add_do_command("Home", |_| Some(0), || CommandState::Done);

    stream.inbox.borrow_mut().extend(data.iter().copied());
    for _ in 0..4 {
        let _ = protocol.update();
    }
});
