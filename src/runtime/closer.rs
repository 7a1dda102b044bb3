//! The Closer task (§4.7): turns a [`super::ConnectionHandle::close`] request into a
//! queued CONNECTION_CLOSE and waits out the RFC9000 §10.2 draining period before the
//! connection is considered fully torn down.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::info;

use crate::connection::{Connection, ConnectionState};

pub async fn run(conn: Arc<Mutex<Connection>>, wake: Arc<Notify>, mut close_rx: mpsc::Receiver<(u64, String)>) {
    let Some((error_code, reason)) = close_rx.recv().await else {
        return;
    };

    let drain_for = {
        let mut guard = conn.lock().await;
        guard.close(error_code, &reason);
        guard.draining_duration()
    };
    wake.notify_one();
    info!(error_code, reason, ?drain_for, "connection closing");

    tokio::time::sleep(drain_for).await;

    let mut guard = conn.lock().await;
    guard.state = ConnectionState::Closed;
    info!("connection drained");
}
