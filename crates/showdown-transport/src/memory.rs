//! In-process transport for tests.
//!
//! [`MemoryConnector::pair`] returns a connector for the client and a
//! [`MemoryListener`] for the test. Every `connect` call shows up on the
//! listener as a [`MemoryPeer`], which plays the server side of that
//! connection. Dropping the peer closes the connection from the server's
//! end; dropping the listener makes further `connect` calls fail.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, Connector, TransportError};

/// Client side of the in-memory transport.
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    /// Number of upcoming `connect` calls that should fail.
    refuse: AtomicU32,
}

impl MemoryConnector {
    /// Creates a connected connector/listener pair.
    pub fn pair() -> (Self, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self {
                accept_tx,
                refuse: AtomicU32::new(0),
            },
            MemoryListener { accept_rx },
        )
    }

    /// Makes the next `count` connection attempts fail.
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, url: &str) -> Result<Self::Connection, TransportError> {
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory connector refused the connection",
            )));
        }

        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let id = ConnectionId::next();

        let peer = MemoryPeer {
            id,
            url: url.to_owned(),
            tx: to_client_tx,
            rx: to_server_rx,
        };
        self.accept_tx.send(peer).map_err(|_| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory listener dropped",
            ))
        })?;

        tracing::debug!(%id, url, "memory connection opened");
        Ok(MemoryConnection {
            id,
            tx: StdMutex::new(Some(to_server_tx)),
            rx: Mutex::new(to_client_rx),
        })
    }
}

/// Receives the server ends of connections opened by a [`MemoryConnector`].
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Waits for the next connection attempt.
    ///
    /// Returns `None` once the connector has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }
}

/// Server end of one in-memory connection.
pub struct MemoryPeer {
    id: ConnectionId,
    url: String,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Id of the matching client connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// URL the client dialled.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Pushes one frame to the client. Returns `false` if the client is gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }

    /// Waits for the next frame the client sent.
    ///
    /// Returns `None` once the client closed the connection.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Client end of one in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    /// `None` after `close`.
    tx: StdMutex<Option<mpsc::UnboundedSender<String>>>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &str) -> Result<(), TransportError> {
        let guard = self
            .tx
            .lock()
            .map_err(|_| TransportError::ConnectionClosed("sender poisoned".into()))?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed("closed locally".into()))?;
        tx.send(data.to_owned()).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "memory peer dropped",
            ))
        })
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
        self.rx.lock().await.close();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_round_trips_frames() {
        let (connector, mut listener) = MemoryConnector::pair();
        let conn = connector.connect("mem://server").await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        assert_eq!(peer.url(), "mem://server");
        assert_eq!(peer.id(), conn.id());

        assert!(peer.send("o"));
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("o"));

        conn.send("[\"|/join lobby\"]").await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("[\"|/join lobby\"]"));
    }

    #[tokio::test]
    async fn test_memory_peer_drop_reads_as_clean_close() {
        let (connector, mut listener) = MemoryConnector::pair();
        let conn = connector.connect("mem://server").await.unwrap();
        drop(listener.accept().await.unwrap());

        assert!(conn.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_close_ends_peer_stream() {
        let (connector, mut listener) = MemoryConnector::pair();
        let conn = connector.connect("mem://server").await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        conn.close().await.unwrap();

        assert!(peer.recv().await.is_none());
        assert!(conn.send("late").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_refuse_next_fails_connects() {
        let (connector, _listener) = MemoryConnector::pair();
        connector.refuse_next(2);

        assert!(connector.connect("mem://a").await.is_err());
        assert!(connector.connect("mem://a").await.is_err());
        assert!(connector.connect("mem://a").await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_connect_after_listener_drop_fails() {
        let (connector, listener) = MemoryConnector::pair();
        drop(listener);

        let result = connector.connect("mem://a").await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
