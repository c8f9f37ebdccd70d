use thiserror::Error;

use crate::generator::ParseFailure;

// ─── Startup (fatal) ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read checkpoint {path}: {reason}")]
    Checkpoint { path: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("platform rejected credentials ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("token endpoint unreachable: {0}")]
    Transport(String),
}

// ─── Recoverable (caught by the control loop) ────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("generation request failed: {0:#}")]
    Upstream(anyhow::Error),

    #[error("generation output unusable: {0}")]
    Unparseable(#[from] ParseFailure),
}

#[derive(Debug, Error)]
pub enum PublishFailure {
    #[error("r/{destination} rejected submission: {message}")]
    Rejected {
        destination: String,
        message: String,
    },

    #[error("r/{destination} rejected all {attempts} tag alternatives, last error: {last}")]
    TagRetriesExhausted {
        destination: String,
        attempts: usize,
        last: String,
    },
}

#[derive(Debug, Error)]
pub enum DiscoveryFailure {
    #[error("listing r/{destination}/{order} failed: {message}")]
    Listing {
        destination: String,
        order: &'static str,
        message: String,
    },
}
