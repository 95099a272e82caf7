use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::PathBuf;

pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("SHAREBOX_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/data"))
});

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("config.yaml"));
pub static DATABASE_PATH: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("database.sqlite"));
pub static SHARES_DIR: Lazy<PathBuf> = Lazy::new(|| DATA_DIR.join("shares"));

/// Name of the derived archive inside a share directory. File bytes are
/// stored under their uuid, so this can never collide with a file.
pub const ARCHIVE_FILE_NAME: &str = "archive.zip";

/// Expiration value meaning "never expires" (unix epoch zero).
pub const NEVER_EXPIRES: &str = "1970-01-01T00:00:00+00:00";

pub const SHARE_ID_MIN_LEN: usize = 3;
pub const SHARE_ID_MAX_LEN: usize = 50;
pub const GENERATED_SHARE_ID_LEN: usize = 10;
pub const PUBLIC_TOKEN_LEN: usize = 32;

pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_ZIP_COMPRESSION_LEVEL: u8 = 9;

pub const SHARE_TOKEN_HEADER: &str = "x-share-token";

pub static OFFICE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["doc", "docx", "xls", "xlsx", "ppt", "pptx"]
        .into_iter()
        .collect()
});

pub static CODE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "js", "ts", "jsx", "tsx", "py", "java", "cpp", "c", "h", "css", "html", "xml", "json",
        "yaml", "yml",
    ]
    .into_iter()
    .collect()
});
