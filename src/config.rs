use std::env;
use std::path::PathBuf;

/// Runtime limits and paths, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Max archive entries captured into a persisted Package Record.
    pub package_file_cap: usize,
    /// Bound on total declared uncompressed size of an uploaded archive.
    pub max_archive_bytes: u64,
    /// Byte budget for the JSON record store.
    pub storage_quota_bytes: u64,
    pub max_drafts: usize,
    pub draft_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            port: env_parse("PORT", 8081),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".into())),
            package_file_cap: env_parse("PACKAGE_FILE_CAP", 50),
            max_archive_bytes: env_parse("MAX_ARCHIVE_BYTES", 512 * 1024 * 1024),
            storage_quota_bytes: env_parse("STORAGE_QUOTA_BYTES", 256 * 1024 * 1024),
            max_drafts: env_parse("MAX_DRAFTS", 10),
            draft_retention_days: env_parse("DRAFT_RETENTION_DAYS", 7),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}
