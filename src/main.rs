//! A thin CLI wrapper around the `quicheling` library: enough to open a loopback-style
//! client or server connection over a real UDP socket from the command line. There is no
//! production TLS collaborator (§2a), so both sides run the deterministic mock handshake
//! and can only usefully talk to each other.

use std::net::SocketAddr;
use std::sync::Arc;

use quicheling::config::{ClientConfig, EndpointConfig, ServerConfig};
use quicheling::connection::Connection;
use quicheling::handshake::MockTlsEngineFactory;
use quicheling::packet::types::ConnectionId;
use quicheling::primitives::rand;
use quicheling::runtime;

fn usage() -> ! {
    eprintln!("usage: quicheling server <bind-addr:port>");
    eprintln!("       quicheling client <server-name> <connect-addr:port>");
    std::process::exit(2);
}

fn new_local_cid() -> ConnectionId {
    ConnectionId::new(8, rand::random_bytes(8))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("server") => {
            let bind_addr: SocketAddr = args.next().unwrap_or_else(|| usage()).parse().unwrap_or_else(|_| usage());
            run_server(bind_addr).await;
        }
        Some("client") => {
            let server_name = args.next().unwrap_or_else(|| usage());
            let connect_addr: SocketAddr = args.next().unwrap_or_else(|| usage()).parse().unwrap_or_else(|_| usage());
            run_client(server_name, connect_addr).await;
        }
        _ => usage(),
    }
}

async fn run_server(bind_addr: SocketAddr) {
    let socket = tokio::net::UdpSocket::bind(bind_addr).await.expect("bind failed");
    tracing::info!(%bind_addr, "listening");

    let mut buf = [0u8; 1500];
    let (n, peer_addr) = socket.recv_from(&mut buf).await.expect("recv failed");

    let socket = tokio::net::UdpSocket::bind(bind_addr).await.expect("rebind failed");
    socket.connect(peer_addr).await.expect("connect failed");

    let config = ServerConfig {
        endpoint: EndpointConfig::new(Arc::new(MockTlsEngineFactory)),
        require_retry: false,
    };
    let local_cid = new_local_cid();
    // Good enough for this single-peer demo binary: treat the first Initial's leading
    // bytes as the peer's dcid rather than fully parsing the long header here, since
    // `Connection::on_datagram_received` re-parses it properly once the runtime takes over.
    let peer_cid = ConnectionId::from_bytes(&buf[..n.min(20)]);
    let connection = Connection::new_server(config.endpoint, Vec::new(), local_cid, peer_cid).expect("connection setup failed");

    let handle = runtime::spawn(connection, socket, peer_addr).expect("spawn failed");
    tracing::info!(%peer_addr, "connection established, serving until interrupted");
    tokio::signal::ctrl_c().await.ok();
    handle.close(0, "server shutting down").await;
}

async fn run_client(server_name: String, connect_addr: SocketAddr) {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.expect("bind failed");
    socket.connect(connect_addr).await.expect("connect failed");

    let config = ClientConfig {
        endpoint: EndpointConfig::new(Arc::new(MockTlsEngineFactory)),
        server_name,
    };
    let local_cid = new_local_cid();
    let initial_peer_cid = new_local_cid();
    let connection = Connection::new_client(config.endpoint, Vec::new(), local_cid, initial_peer_cid).expect("connection setup failed");

    let handle = runtime::spawn(connection, socket, connect_addr).expect("spawn failed");
    tracing::info!(%connect_addr, "connecting");
    tokio::signal::ctrl_c().await.ok();
    handle.close(0, "client shutting down").await;
}
