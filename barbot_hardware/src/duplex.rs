//! Non-blocking byte stream over a reader thread and a crossbeam channel.
//!
//! The protocol engine must never block on input, but `std::io` readers do;
//! a dedicated thread pumps bytes into an unbounded channel that the
//! cooperative loop drains with `try_recv`.

use std::io::{Read, Write};

use crossbeam_channel::{Receiver, TryRecvError, unbounded};

use barbot_traits::{BoxError, Duplex};

use crate::error::HwError;

pub struct ChannelDuplex<W: Write> {
    rx: Receiver<u8>,
    writer: W,
}

impl<W: Write> ChannelDuplex<W> {
    /// Spawn a reader thread over `reader`; the channel disconnects at EOF.
    pub fn from_reader(mut reader: impl Read + Send + 'static, writer: W) -> Self {
        let (tx, rx) = unbounded();
        std::thread::spawn(move || {
            let mut buf = [0u8; 256];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        for &b in &buf[..n] {
                            if tx.send(b).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "stream reader stopped");
                        break;
                    }
                }
            }
        });
        Self { rx, writer }
    }
}

impl ChannelDuplex<std::io::Stdout> {
    /// Command stream over this process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::from_reader(std::io::stdin(), std::io::stdout())
    }
}

impl<W: Write> Duplex for ChannelDuplex<W> {
    fn poll_byte(&mut self) -> Result<Option<u8>, BoxError> {
        match self.rx.try_recv() {
            Ok(b) => Ok(Some(b)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Box::new(HwError::StreamClosed)),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        self.writer.write_all(bytes).map_err(HwError::Io)?;
        self.writer.flush().map_err(HwError::Io)?;
        Ok(())
    }
}
