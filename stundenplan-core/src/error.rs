use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Feed ingestion failed: {message}")]
    Feed { message: String },

    #[error("Intermediate table is missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network timeout")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;
