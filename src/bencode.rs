//! Bencode encoding and decoding (BEP-3)
//!
//! Bencode is the encoding used by BitTorrent for storing and transmitting
//! loosely structured data. Decoded values keep track of the byte range
//! they occupied in the source stream, which is how the exact `info`
//! dictionary bytes are recovered for info-hash computation.

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::BencodeError;
pub use value::{Value, ValueKind};
