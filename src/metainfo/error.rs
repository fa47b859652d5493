use crate::bencode::BencodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("field has wrong type: {0}")]
    FieldType(&'static str),

    /// The info dictionary carries neither `length` nor `files`.
    #[error("info dictionary describes no files")]
    InvalidInfoDict,

    /// The `pieces` string is not a multiple of 20 bytes.
    #[error("piece hash string has invalid length")]
    InvalidPieceHashes,

    #[error("invalid hash length")]
    InvalidHashLength,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
