use std::path::PathBuf;

/// Core error type for the export tooling.
///
/// The binary maps everything it touches into this type so that failures are
/// reported the same way regardless of which stage (reader, chunker, report)
/// produced them. Wrapped errors are exposed through `source()` only, so a
/// chained report (`{err:#}`) names each cause once.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot open {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("json error")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
