use thiserror::Error;

/// Failures raised by the packaging core.
///
/// Soft conditions are deliberately absent from this enum: a missing manifest
/// is reported through `LocatedManifest::manifest_path == None`, a per-entry
/// decode failure leaves `ArchiveEntry::content == None`, and a failed model
/// extraction returns `None`. Only conditions that abort the current
/// operation live here.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("archive is not a valid zip container")]
    CorruptArchive(#[source] zip::result::ZipError),

    #[error("entry `{0}` not found in archive")]
    EntryMissing(String),

    #[error("archive declares {declared} uncompressed bytes, over the {limit} byte limit")]
    ArchiveTooLarge { declared: u64, limit: u64 },

    #[error("failed to render package: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage quota exceeded: writing {needed} bytes would pass the {limit} byte quota")]
    QuotaExceeded { needed: u64, limit: u64 },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage i/o failed")]
    Io(#[from] std::io::Error),

    #[error("stored record is not valid JSON")]
    Serde(#[from] serde_json::Error),
}
