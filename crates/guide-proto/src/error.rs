use crate::catalog::Channel;
use thiserror::Error;

/// Failures surfaced by the engine's collaborators.  Every variant has a
/// defined state transition — none aborts the engine loop.
#[derive(Debug, Error)]
pub enum GuideError {
    /// Network or parse failure fetching a channel's catalog.  Degrades that
    /// channel's view state and sets the retry-on-next-attach flag.
    #[error("catalog fetch failed for {channel}: {message}")]
    CatalogFetch { channel: Channel, message: String },

    /// Registration or activation failed.  Surfaced to the presentation
    /// layer; never silently retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Connectivity precondition failed before the operation began.
    #[error("no network connection")]
    NoNetwork,
}
