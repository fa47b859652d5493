use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write at offset {offset} falls outside the file table")]
    OffsetOutOfRange { offset: u64 },
}
