use thiserror::Error;

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(String),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },

    #[error("failed to read config file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: dotenvy::Error,
    },

    #[error("unknown endpoint {0}")]
    UnknownEndpoint(String),
}

/// Errors raised while fetching one endpoint
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("status code {0}")]
    Http(u16),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid date {0:?}")]
    InvalidDate(String),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors raised while loading the warehouse table
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not connect to warehouse: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("could not start transaction: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("schema reset failed: {0}")]
    SchemaReset(#[source] sqlx::Error),

    #[error("insert failed: {0}")]
    Insert(#[source] sqlx::Error),

    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),
}
