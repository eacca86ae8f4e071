//! In-memory stdin relay between stdin requests and the output pump.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc;

/// The pump side of the relay is gone; the execution has ended.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("stdin relay closed")]
pub struct RelayClosed;

/// End-of-transmission; closes the child's stdin instead of being written.
const EOT: u8 = 0x04;

/// One item read from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayInput {
    Data(Bytes),
    /// Ctrl-D: the child should see end of input.
    Eof,
}

/// Create a relay pair for one execution.
#[must_use]
pub fn relay_channel() -> (RelaySender, RelayReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RelaySender { tx }, RelayReceiver { rx, held: None })
}

/// Writer half, held by the process registry.
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<RelayInput>,
}

impl RelaySender {
    /// Queue input for the child. Chunks are delivered in call order.
    ///
    /// Every EOT byte is turned into [`RelayInput::Eof`] at its position.
    ///
    /// # Errors
    /// Returns [`RelayClosed`] once the pump has stopped reading.
    pub fn send(&self, input: impl Into<Bytes>) -> Result<(), RelayClosed> {
        let mut input: Bytes = input.into();
        while let Some(at) = input.iter().position(|&b| b == EOT) {
            let head = input.split_to(at);
            input.advance(1);
            if !head.is_empty() {
                self.push(RelayInput::Data(head))?;
            }
            self.push(RelayInput::Eof)?;
        }
        if input.is_empty() {
            return Ok(());
        }
        self.push(RelayInput::Data(input))
    }

    fn push(&self, item: RelayInput) -> Result<(), RelayClosed> {
        self.tx.send(item).map_err(|_| RelayClosed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Reader half, owned by the stdin writer.
#[derive(Debug)]
pub struct RelayReceiver {
    rx: mpsc::UnboundedReceiver<RelayInput>,
    /// An EOF found while coalescing, returned on the next call.
    held: Option<RelayInput>,
}

impl RelayReceiver {
    /// Wait for input, then merge the data already queued behind it.
    ///
    /// Merging stops at an EOF, which is always returned on its own.
    /// Returns `None` when every sender is gone. Cancel safe.
    pub async fn recv_pending(&mut self) -> Option<RelayInput> {
        let first = match self.held.take() {
            Some(item) => item,
            None => self.rx.recv().await?,
        };
        let RelayInput::Data(first) = first else {
            return Some(RelayInput::Eof);
        };
        let mut buf: Option<BytesMut> = None;
        while let Ok(item) = self.rx.try_recv() {
            match item {
                RelayInput::Data(chunk) => buf
                    .get_or_insert_with(|| BytesMut::from(&first[..]))
                    .extend_from_slice(&chunk),
                RelayInput::Eof => {
                    self.held = Some(RelayInput::Eof);
                    break;
                }
            }
        }
        Some(RelayInput::Data(buf.map_or(first, BytesMut::freeze)))
    }

    /// Stop accepting input; later sends fail with [`RelayClosed`].
    pub fn close(&mut self) {
        self.rx.close();
    }
}
