//! The cooperative per-connection task set (§4.4, §4.5, §4.6, §4.7): a Sender, Receiver,
//! Retransmit/timer, and Closer task, all driving one shared [`Connection`] behind a
//! single lock so the concurrency invariants in §5 hold by construction — at most one
//! task mutates a packet-number space at a time, and every task observes a consistent
//! view of which keys are installed.

pub mod closer;
pub mod receiver;
pub mod retransmit;
pub mod sender;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::connection::Connection;
use crate::error::QuicheResult;

/// A running connection's task set. Dropping this handle does not stop the tasks; call
/// [`ConnectionHandle::close`] to request a graceful shutdown.
pub struct ConnectionHandle {
    close_tx: mpsc::Sender<(u64, String)>,
}

impl ConnectionHandle {
    pub async fn close(&self, error_code: u64, reason: impl Into<String>) {
        let _ = self.close_tx.send((error_code, reason.into())).await;
    }
}

/// Spawns the four tasks for one connection, taking ownership of the already-bound,
/// already-`connect`ed socket (§6 "one UDP socket per connection").
pub fn spawn(connection: Connection, socket: UdpSocket, peer_addr: SocketAddr) -> QuicheResult<ConnectionHandle> {
    let socket = Arc::new(socket);
    let conn = Arc::new(Mutex::new(connection));
    let wake = Arc::new(Notify::new());
    let (close_tx, close_rx) = mpsc::channel(1);

    tokio::spawn(receiver::run(conn.clone(), socket.clone(), wake.clone()));
    tokio::spawn(sender::run(conn.clone(), socket.clone(), peer_addr, wake.clone()));
    tokio::spawn(retransmit::run(conn.clone(), wake.clone()));
    tokio::spawn(closer::run(conn, wake, close_rx));

    Ok(ConnectionHandle { close_tx })
}
