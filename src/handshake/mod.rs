pub mod driver;
pub mod tls;

pub use driver::{HandshakeDriver, HandshakeProgress};
pub use tls::{MockTlsEngineFactory, TlsEngine, TlsEngineFactory};
