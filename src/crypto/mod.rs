pub mod aead;
pub mod context;
pub mod hp;
pub mod secrets;

pub use aead::CipherSuite;
pub use context::{CryptoContext, LevelCrypto, LevelKeys};
