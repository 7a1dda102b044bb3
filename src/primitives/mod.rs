pub mod rand;
pub mod varint;

pub use rand::*;
pub use varint::*;
