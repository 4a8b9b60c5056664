//! Error types for the TAXII 2 feed

use std::error::Error as StdError;

use thiserror::Error;

pub const ERR_NO_COLL: &str =
    "No collection is available for this user, please make sure you entered the configuration correctly";

pub const ERR_CERTIFICATE: &str = "Encountered an HTTPS certificate error. This error can be ignored by enabling \"Trust any certificate (not secure)\" in the instance configuration.";

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("{0}")]
    Configuration(String),

    #[error("{}", ERR_NO_COLL)]
    NoCollections,

    #[error("{0}")]
    Connection(String),

    #[error("HTTPS certificate error: {0}")]
    Certificate(#[source] reqwest::Error),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientCreation(#[source] reqwest::Error),

    #[error("HTTP request error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("TAXII server error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl FeedError {
    pub fn config(msg: impl Into<String>) -> Self {
        FeedError::Configuration(msg.into())
    }

    /// Configuration problems the user can fix in the instance settings.
    pub fn is_configuration(&self) -> bool {
        matches!(self, FeedError::Configuration(_) | FeedError::NoCollections)
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if is_certificate_error(&err) {
            FeedError::Certificate(err)
        } else {
            FeedError::Http(err)
        }
    }
}

/// Walk the source chain looking for a TLS certificate failure.
pub fn is_certificate_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        let msg = e.to_string().to_lowercase();
        if msg.contains("certificate") || msg.contains("unknownissuer") {
            return true;
        }
        current = e.source();
    }
    false
}

/// Render an error and its sources, outermost first.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut current = err.source();
    while let Some(e) = current {
        lines.push(format!("caused by: {}", e));
        current = e.source();
    }
    lines.join("\n")
}

/// Message reported to the user when `command` fails.
pub fn command_failure_message(command: &str, err: &FeedError) -> String {
    let msg = format!(
        "Failed to execute {} command. Error: {}\n\ntraceback: {}",
        command,
        err,
        error_chain(err)
    );
    if matches!(err, FeedError::Certificate(_)) {
        tracing::error!(command, "{}", msg);
        return ERR_CERTIFICATE.to_string();
    }
    msg
}
