//! The Retransmit/timer task (§4.6): the loss-detection and PTO clock for one connection.
//! Sleeps until [`Connection::on_loss_timeout`]'s next deadline, then re-evaluates —
//! either packets were declared lost and requeued, or the PTO fired and a probe is due —
//! and wakes the sender either way.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::connection::Connection;

pub async fn run(conn: Arc<Mutex<Connection>>, wake: Arc<Notify>) {
    loop {
        let deadline = {
            let mut guard = conn.lock().await;
            guard.on_loss_timeout(Instant::now())
        };

        let Some(deadline) = deadline else {
            // Nothing in flight to time out; wait for the next send or receive to
            // change that before checking again.
            wake.notified().await;
            continue;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline.into()) => {
                let mut guard = conn.lock().await;
                if guard.on_loss_timeout(Instant::now()).is_some() {
                    guard.on_pto_expired();
                    debug!("pto fired");
                }
                drop(guard);
                wake.notify_one();
            }
            _ = wake.notified() => {
                // State changed underneath us (new packet sent, ack received); loop
                // back around and recompute the deadline from scratch.
            }
        }
    }
}
