pub mod cid;
pub mod connection;
pub mod flow;
pub mod space;
pub mod streams;
pub mod types;

pub use connection::{Connection, Role};
pub use types::ConnectionState;
