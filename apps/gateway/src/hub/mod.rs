//! The realtime hub.
//!
//! One owner task holds every index (connections, per-room sets, per-user
//! sets). Nothing else touches them: registration, teardown, and fan-out all
//! arrive over channels and are applied serially, so there is never a
//! partial view of the index from outside.

pub mod connection;
pub mod frame;
pub mod server;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{mpsc, oneshot, watch};

pub use connection::{ConnId, Connection, ConnectionRx};
use connection::EnqueueError;

/// Fan-out instructions accepted by the hub task.
#[derive(Debug)]
enum Broadcast {
    Room { live_id: i64, frame: Utf8Bytes },
    User { user_id: i64, frame: Utf8Bytes },
    All { frame: Utf8Bytes },
}

enum Control {
    Snapshot { reply: oneshot::Sender<HubSnapshot> },
    Shutdown,
}

/// Index counts, for tests and operational logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubSnapshot {
    pub connections: usize,
    pub rooms: usize,
    pub users: usize,
}

/// Cloneable handle to the hub task.
#[derive(Clone)]
pub struct Hub {
    shared: Arc<HubShared>,
}

struct HubShared {
    register_tx: mpsc::UnboundedSender<Arc<Connection>>,
    unregister_tx: mpsc::UnboundedSender<ConnId>,
    broadcast_tx: mpsc::UnboundedSender<Broadcast>,
    control_tx: mpsc::UnboundedSender<Control>,
    count_rx: watch::Receiver<usize>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Hub {
    /// Start the owner task and return its handle.
    pub fn spawn(queue_capacity: usize) -> Self {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (count_tx, count_rx) = watch::channel(0usize);

        tokio::spawn(run(
            register_rx,
            unregister_rx,
            broadcast_rx,
            control_rx,
            count_tx,
        ));

        Self {
            shared: Arc::new(HubShared {
                register_tx,
                unregister_tx,
                broadcast_tx,
                control_tx,
                count_rx,
                next_id: AtomicU64::new(0),
                queue_capacity,
            }),
        }
    }

    /// Create a connection and install it in the indices. The returned
    /// receiver halves belong to the connection's writer and reader tasks.
    pub fn connect(&self, user_id: i64, live_id: i64) -> (Arc<Connection>, ConnectionRx) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (conn, rx) = Connection::new(id, user_id, live_id, self.shared.queue_capacity);
        let conn = Arc::new(conn);
        let _ = self.shared.register_tx.send(conn.clone());
        (conn, rx)
    }

    /// Request teardown. Duplicate requests are absorbed.
    pub fn unregister(&self, id: ConnId) {
        let _ = self.shared.unregister_tx.send(id);
    }

    /// Deliver to every connection in the room.
    pub fn broadcast_room(&self, live_id: i64, frame: Utf8Bytes) {
        let _ = self.shared.broadcast_tx.send(Broadcast::Room { live_id, frame });
    }

    /// Deliver to every connection the user has open.
    pub fn broadcast_user(&self, user_id: i64, frame: Utf8Bytes) {
        let _ = self.shared.broadcast_tx.send(Broadcast::User { user_id, frame });
    }

    /// Deliver to every connection. For operational announcements, not the
    /// hot path.
    pub fn broadcast_all(&self, frame: Utf8Bytes) {
        let _ = self.shared.broadcast_tx.send(Broadcast::All { frame });
    }

    /// Connections currently installed in the indices.
    pub fn connection_count(&self) -> usize {
        *self.shared.count_rx.borrow()
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        let (reply, rx) = oneshot::channel();
        let _ = self.shared.control_tx.send(Control::Snapshot { reply });
        rx.await.unwrap_or(HubSnapshot {
            connections: 0,
            rooms: 0,
            users: 0,
        })
    }

    /// Close every connection, then wait until the index is empty or the
    /// deadline passes, whichever comes first.
    pub async fn shutdown(&self, deadline: Duration) {
        let _ = self.shared.control_tx.send(Control::Shutdown);
        let mut count_rx = self.shared.count_rx.clone();
        let drained = tokio::time::timeout(deadline, async {
            loop {
                if *count_rx.borrow_and_update() == 0 {
                    break;
                }
                if count_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                live = self.connection_count(),
                "shutdown deadline hit with connections still open"
            );
        }
    }
}

struct HubState {
    conns: HashMap<ConnId, Arc<Connection>>,
    rooms: HashMap<i64, HashSet<ConnId>>,
    users: HashMap<i64, HashSet<ConnId>>,
    count_tx: watch::Sender<usize>,
}

async fn run(
    mut register_rx: mpsc::UnboundedReceiver<Arc<Connection>>,
    mut unregister_rx: mpsc::UnboundedReceiver<ConnId>,
    mut broadcast_rx: mpsc::UnboundedReceiver<Broadcast>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    count_tx: watch::Sender<usize>,
) {
    let mut state = HubState {
        conns: HashMap::new(),
        rooms: HashMap::new(),
        users: HashMap::new(),
        count_tx,
    };

    loop {
        tokio::select! {
            Some(conn) = register_rx.recv() => state.register(conn),
            Some(id) = unregister_rx.recv() => state.unregister(id),
            Some(broadcast) = broadcast_rx.recv() => state.broadcast(broadcast),
            control = control_rx.recv() => match control {
                Some(Control::Snapshot { reply }) => {
                    let _ = reply.send(state.snapshot());
                }
                Some(Control::Shutdown) => state.close_all(),
                // Every handle is gone; the hub dies with the process.
                None => break,
            },
        }
    }
}

impl HubState {
    fn register(&mut self, conn: Arc<Connection>) {
        tracing::debug!(
            conn_id = conn.id,
            user_id = conn.user_id,
            live_id = conn.live_id,
            "connection registered"
        );
        if conn.user_id != 0 {
            self.users.entry(conn.user_id).or_default().insert(conn.id);
        }
        if conn.live_id != 0 {
            self.rooms.entry(conn.live_id).or_default().insert(conn.id);
        }
        self.conns.insert(conn.id, conn);
        self.publish_count();
    }

    /// Purge one connection from every index. The second call for the same
    /// id finds nothing and is a no-op.
    fn unregister(&mut self, id: ConnId) {
        let Some(conn) = self.conns.remove(&id) else {
            return;
        };
        conn.begin_close();
        if conn.user_id != 0 {
            if let Some(set) = self.users.get_mut(&conn.user_id) {
                set.remove(&id);
                if set.is_empty() {
                    self.users.remove(&conn.user_id);
                }
            }
        }
        if conn.live_id != 0 {
            if let Some(set) = self.rooms.get_mut(&conn.live_id) {
                set.remove(&id);
                if set.is_empty() {
                    self.rooms.remove(&conn.live_id);
                }
            }
        }
        tracing::debug!(conn_id = id, user_id = conn.user_id, "connection unregistered");
        self.publish_count();
    }

    fn broadcast(&mut self, broadcast: Broadcast) {
        match broadcast {
            Broadcast::Room { live_id, frame } => {
                let ids: Vec<ConnId> = match self.rooms.get(&live_id) {
                    Some(set) => set.iter().copied().collect(),
                    None => return,
                };
                self.deliver_to(ids, frame);
            }
            Broadcast::User { user_id, frame } => {
                let ids: Vec<ConnId> = match self.users.get(&user_id) {
                    Some(set) => set.iter().copied().collect(),
                    None => return,
                };
                self.deliver_to(ids, frame);
            }
            Broadcast::All { frame } => {
                let ids: Vec<ConnId> = self.conns.keys().copied().collect();
                self.deliver_to(ids, frame);
            }
        }
    }

    /// Delivery is per-target independent: one dead-slow consumer loses its
    /// connection, everyone else is unaffected.
    fn deliver_to(&mut self, ids: Vec<ConnId>, frame: Utf8Bytes) {
        for id in ids {
            let Some(conn) = self.conns.get(&id).cloned() else {
                continue;
            };
            match conn.enqueue(frame.clone()) {
                Ok(()) => {}
                Err(EnqueueError::Full) => {
                    tracing::warn!(
                        conn_id = id,
                        user_id = conn.user_id,
                        "send queue overflow, evicting slow consumer"
                    );
                    self.unregister(id);
                }
                Err(EnqueueError::Closed) => self.unregister(id),
            }
        }
    }

    fn close_all(&mut self) {
        let ids: Vec<ConnId> = self.conns.keys().copied().collect();
        tracing::info!(connections = ids.len(), "closing all connections");
        for id in ids {
            self.unregister(id);
        }
    }

    fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            connections: self.conns.len(),
            rooms: self.rooms.len(),
            users: self.users.len(),
        }
    }

    fn publish_count(&self) {
        let _ = self.count_tx.send(self.conns.len());
    }
}
