//! The Sender task (§4.4): drains whatever each encryption level's
//! [`Connection::poll_transmit`] has queued — CRYPTO bytes, ACKs, retransmissions — onto
//! the wire, in ascending encryption-level order so Initial flights are never starved by
//! Application traffic.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::packet::types::EncryptionLevel;

const SEND_LEVELS: [EncryptionLevel; 4] = [
    EncryptionLevel::Initial,
    EncryptionLevel::Handshake,
    EncryptionLevel::ZeroRtt,
    EncryptionLevel::OneRtt,
];

pub async fn run(conn: Arc<Mutex<Connection>>, socket: Arc<UdpSocket>, peer_addr: SocketAddr, wake: Arc<Notify>) {
    loop {
        wake.notified().await;
        drain_once(&conn, &socket, peer_addr).await;
    }
}

async fn drain_once(conn: &Arc<Mutex<Connection>>, socket: &UdpSocket, peer_addr: SocketAddr) {
    loop {
        let now = Instant::now();
        let packet = {
            let mut guard = conn.lock().await;
            let mut found = None;
            for level in SEND_LEVELS {
                match guard.poll_transmit(level, now) {
                    Ok(Some(packet)) => {
                        found = Some(packet);
                        break;
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(?err, ?peer_addr, "failed to build outgoing packet");
                        continue;
                    }
                }
            }
            found
        };

        let Some(packet) = packet else { break };
        if let Err(err) = socket.send_to(&packet, peer_addr).await {
            warn!(?err, ?peer_addr, "udp send failed");
            break;
        }
        debug!(bytes = packet.len(), ?peer_addr, "sent datagram");
    }
}
