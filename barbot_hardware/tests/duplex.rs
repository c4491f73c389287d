use std::io::Cursor;
use std::sync::{Arc, Mutex};

use barbot_hardware::ChannelDuplex;
use barbot_traits::Duplex;

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn drain(duplex: &mut ChannelDuplex<SharedSink>) -> Vec<u8> {
    let mut out = Vec::new();
    // the reader thread needs a moment to pump the bytes through
    for _ in 0..100 {
        match duplex.poll_byte() {
            Ok(Some(b)) => out.push(b),
            Ok(None) => std::thread::sleep(std::time::Duration::from_millis(1)),
            Err(_) => break,
        }
    }
    out
}

#[test]
fn bytes_flow_through_and_eof_closes() {
    let sink = SharedSink::default();
    let mut duplex = ChannelDuplex::from_reader(Cursor::new(b"Home.".to_vec()), sink.clone());

    let received = drain(&mut duplex);
    assert_eq!(received, b"Home.");

    // reader hit EOF, channel disconnects
    let closed = (0..100).any(|_| {
        std::thread::sleep(std::time::Duration::from_millis(1));
        duplex.poll_byte().is_err()
    });
    assert!(closed, "expected stream-closed error after EOF");
}

#[test]
fn send_writes_through_to_the_sink() {
    let sink = SharedSink::default();
    let mut duplex = ChannelDuplex::from_reader(Cursor::new(Vec::new()), sink.clone());
    duplex.send(b"ACK Home\r\n").unwrap();
    assert_eq!(sink.0.lock().unwrap().as_slice(), b"ACK Home\r\n");
}
