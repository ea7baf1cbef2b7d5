use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A write collided with another writer. The index is single-writer
    /// by construction, so observing this means that invariant broke.
    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
