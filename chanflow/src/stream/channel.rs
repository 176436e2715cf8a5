//! Rendezvous channel backing every pipeline link.
//!
//! A send completes only once the consumer has taken the element, so a
//! producer never runs more than one element ahead of its consumer.

use crate::errors::StreamError;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// An element in transit plus the acknowledgment the consumer fires on receipt.
struct Handoff<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

/// Creates a linked sender/stream pair.
#[must_use]
pub fn channel<T>() -> (StreamSender<T>, Stream<T>) {
    let (tx, rx) = mpsc::channel(1);
    (
        StreamSender {
            tx: Some(tx),
            sent: 0,
        },
        Stream {
            rx,
            finished: false,
            received: 0,
        },
    )
}

/// The single writing end of a [`Stream`].
///
/// Not `Clone`: each stream has exactly one producer. Dropping the sender
/// closes the stream.
pub struct StreamSender<T> {
    tx: Option<mpsc::Sender<Handoff<T>>>,
    sent: u64,
}

impl<T> StreamSender<T> {
    /// Hands `value` to the consumer, waiting until it has been taken.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if this sender was closed and
    /// [`StreamError::Disconnected`] if the consumer is gone.
    pub async fn send(&mut self, value: T) -> Result<(), StreamError> {
        let tx = self.tx.as_ref().ok_or(StreamError::Closed)?;
        let (taken, ack) = oneshot::channel();

        tx.send(Handoff { value, taken })
            .await
            .map_err(|_| StreamError::Disconnected)?;
        ack.await.map_err(|_| StreamError::Disconnected)?;

        self.sent += 1;
        Ok(())
    }

    /// Closes the stream.
    ///
    /// Returns `true` if this call closed it and `false` if it was already
    /// closed; repeated calls are no-ops.
    pub fn close(&mut self) -> bool {
        self.tx.take().is_some()
    }

    /// Returns whether this sender has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Returns whether the consumer has dropped its end.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.tx.as_ref().is_some_and(mpsc::Sender::is_closed)
    }

    /// Number of elements the consumer has taken.
    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }
}

impl<T> fmt::Debug for StreamSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSender")
            .field("closed", &self.is_closed())
            .field("sent", &self.sent)
            .finish()
    }
}

/// The reading end of a pipeline link.
///
/// Yields elements in the order they were sent, then `None` once the
/// producer closed. Closure is sticky: every later read returns `None`.
pub struct Stream<T> {
    rx: mpsc::Receiver<Handoff<T>>,
    finished: bool,
    received: u64,
}

impl<T> Stream<T> {
    /// Receives the next element, or `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<T> {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Polls for the next element.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(handoff)) => {
                // The producer may have stopped waiting; the element is ours either way.
                let _ = handoff.taken.send(());
                self.received += 1;
                Poll::Ready(Some(handoff.value))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    /// Returns whether closure has been observed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.finished
    }

    /// Number of elements received so far.
    #[must_use]
    pub const fn received(&self) -> u64 {
        self.received
    }
}

impl<T> futures::Stream for Stream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().poll_recv(cx)
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("closed", &self.finished)
            .field("received", &self.received)
            .finish()
    }
}
