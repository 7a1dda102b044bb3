//! The Receiver task (§4.5): pulls datagrams off the socket and feeds them to
//! [`Connection::on_datagram_received`], then wakes the sender so any ACK or
//! state transition it produced goes out promptly.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::connection::Connection;

const MAX_DATAGRAM_SIZE: usize = 65535;

pub async fn run(conn: Arc<Mutex<Connection>>, socket: Arc<UdpSocket>, wake: Arc<Notify>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let n = match socket.recv(&mut buf).await {
            Ok(n) => n,
            Err(err) => {
                warn!(?err, "udp recv failed");
                continue;
            }
        };
        if n == 0 {
            continue;
        }

        let now = Instant::now();
        let mut guard = conn.lock().await;
        match guard.on_datagram_received(&buf[..n], now) {
            Ok(()) => debug!(bytes = n, "received datagram"),
            Err(err) => debug!(?err, bytes = n, "dropping unprocessable datagram"),
        }
        drop(guard);

        wake.notify_one();
    }
}
