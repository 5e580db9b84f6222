//! Per-connection state: the bounded outbound queue and the one-shot close
//! flag.

use std::time::Instant;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{mpsc, watch};

pub type ConnId = u64;

/// Why a non-blocking enqueue was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is full; the consumer is dead-slow.
    Full,
    /// The writer side is gone.
    Closed,
}

/// One live WebSocket connection as the hub sees it.
///
/// The hub never writes to the socket; it enqueues onto the bounded frame
/// queue, and the connection's single writer task drains it. The closed flag
/// transitions false→true at most once.
pub struct Connection {
    pub id: ConnId,
    /// Owning user, 0 if anonymous.
    pub user_id: i64,
    /// Joined room, 0 if not in any room.
    pub live_id: i64,
    pub joined_at: Instant,
    frames: mpsc::Sender<Utf8Bytes>,
    closed: watch::Sender<bool>,
}

/// The receiving halves handed to the connection's writer and reader tasks.
pub struct ConnectionRx {
    pub frames: mpsc::Receiver<Utf8Bytes>,
    pub closed: watch::Receiver<bool>,
}

impl Connection {
    pub fn new(
        id: ConnId,
        user_id: i64,
        live_id: i64,
        queue_capacity: usize,
    ) -> (Self, ConnectionRx) {
        let (frames_tx, frames_rx) = mpsc::channel(queue_capacity);
        let (closed_tx, closed_rx) = watch::channel(false);
        (
            Self {
                id,
                user_id,
                live_id,
                joined_at: Instant::now(),
                frames: frames_tx,
                closed: closed_tx,
            },
            ConnectionRx {
                frames: frames_rx,
                closed: closed_rx,
            },
        )
    }

    /// Non-blocking enqueue onto the outbound buffer.
    pub fn enqueue(&self, frame: Utf8Bytes) -> Result<(), EnqueueError> {
        use mpsc::error::TrySendError;
        match self.frames.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EnqueueError::Full),
            Err(TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Flip the closed flag. Returns `true` only for the caller that
    /// performed the transition; later calls get `false` and no receiver is
    /// re-notified.
    pub fn begin_close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// A fresh subscription to the closed flag.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_preserves_order_until_full() {
        let (conn, mut rx) = Connection::new(1, 7, 0, 2);
        assert!(conn.enqueue("one".into()).is_ok());
        assert!(conn.enqueue("two".into()).is_ok());
        assert_eq!(conn.enqueue("three".into()), Err(EnqueueError::Full));

        assert_eq!(rx.frames.recv().await.unwrap().as_str(), "one");
        assert_eq!(rx.frames.recv().await.unwrap().as_str(), "two");
    }

    #[tokio::test]
    async fn enqueue_reports_closed_after_receiver_drop() {
        let (conn, rx) = Connection::new(1, 7, 0, 2);
        drop(rx);
        assert_eq!(conn.enqueue("one".into()), Err(EnqueueError::Closed));
    }

    #[tokio::test]
    async fn begin_close_fires_exactly_once() {
        let (conn, rx) = Connection::new(1, 7, 0, 2);
        assert!(!conn.is_closed());
        assert!(conn.begin_close());
        assert!(!conn.begin_close());
        assert!(conn.is_closed());
        drop(rx);
    }

    #[tokio::test]
    async fn closed_signal_wakes_even_when_subscribed_before_the_flip() {
        let (conn, mut rx) = Connection::new(1, 7, 0, 2);
        conn.begin_close();
        // The change happened before the first poll; the watch still reports it.
        rx.closed.changed().await.unwrap();
        assert!(*rx.closed.borrow());
    }
}
