use std::io;

use thiserror::Error;

/// Failure of a single pipeline step
#[derive(Debug, Error)]
pub enum StepError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid request header: {0}")]
    InvalidHeader(String),

    #[error("step needs {0} but no earlier step provided it")]
    MissingInput(&'static str),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step {index} ({step}) failed: {source}")]
    Step {
        index: usize,
        step: &'static str,
        #[source]
        source: StepError,
    },

    #[error("pipeline finished without producing a result")]
    NoOutput,
}

impl PipelineError {
    /// Name of the failing step, if a step failed
    pub fn step(&self) -> Option<&'static str> {
        match self {
            Self::Step { step, .. } => Some(*step),
            Self::NoOutput => None,
        }
    }
}

/// Extractor configuration that cannot be used
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Scrape(#[from] PipelineError),

    #[error("product cache error: {0}")]
    Cache(#[from] RepositoryError),
}

/// Why a report could not be traced back to a product and its markup
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("no delivery recorded for message {0}")]
    UnknownMessage(String),

    #[error("no archived markup for {cache_key}: {source}")]
    MissingMarkup {
        cache_key: String,
        #[source]
        source: RepositoryError,
    },

    #[error("no cached product for {cache_key}: {source}")]
    MissingProduct {
        cache_key: String,
        #[source]
        source: RepositoryError,
    },

    #[error("delivery lookup failed: {0}")]
    Delivery(#[source] RepositoryError),
}
