use thiserror::Error as ThisError;

/// Everything the engine can hand back to a caller. No internal recovery is
/// attempted: I/O failures propagate unchanged, and a CRC mismatch aborts
/// the operation that hit it (including `open`, which refuses to come up on
/// a corrupt directory rather than open silently degraded).
#[derive(Debug, ThisError)]
pub enum Error {
    /// Keys must be non-empty byte strings.
    #[error("the key is empty")]
    KeyEmpty,

    /// The key is not present in the key directory.
    #[error("key not found in the database")]
    KeyNotFound,

    /// Configuration failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The directory's advisory lock is held by another process.
    #[error("the database directory is in use by another process")]
    DirectoryBusy,

    /// A data file name in the directory could not be parsed.
    #[error("the database directory is corrupted")]
    DirectoryCorrupted,

    /// A positional entry references a file id that is no longer open.
    #[error("data file not found")]
    DataFileNotFound,

    /// A stored record failed CRC verification.
    #[error("corrupt record")]
    CorruptRecord,

    /// The key directory reported no prior entry for a key that was just
    /// looked up successfully.
    #[error("failed to update the key directory")]
    IndexUpdateFailed,

    /// Only one merge may run at a time.
    #[error("a merge is already in progress")]
    MergeInProgress,

    /// Reclaimable bytes have not reached the configured merge ratio.
    #[error("reclaimable data has not reached the merge ratio")]
    MergeRatioUnreached,

    /// The volume lacks room for the surviving data.
    #[error("not enough disk space for the merge")]
    NoSpaceForMerge,

    /// The batch staged more records than `max_batch_num` allows.
    #[error("batch exceeds the configured maximum size")]
    BatchTooLarge,

    /// The persistent index has no sequence checkpoint, so batch sequence
    /// numbers could collide with ones already on disk.
    #[error("write batches are unavailable without a sequence checkpoint")]
    BatchUnavailable,

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<datafile::Error> for Error {
    fn from(err: datafile::Error) -> Self {
        match err {
            datafile::Error::Io(e) => Error::Io(e),
            datafile::Error::CorruptRecord => Error::CorruptRecord,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
