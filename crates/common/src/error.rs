//! Error types for the ad rotation service.
//!
//! All fallible operations return `Result<T, Report<AdReelError>>`. None of
//! these errors reach the host application as a failure: the coordinator
//! converts them into breaker bookkeeping and log lines.

use derive_more::Display;

/// Classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TransportErrorKind {
    #[display("dns")]
    Dns,
    #[display("connect")]
    Connect,
    #[display("timeout")]
    Timeout,
    #[display("status {_0}")]
    Status(u16),
    #[display("io")]
    Io,
}

#[derive(Debug, Display, derive_more::Error)]
pub enum AdReelError {
    /// The device reports no usable network connection.
    #[display("Network access unavailable")]
    NetworkUnavailable,

    /// The request never produced a usable response.
    #[display("Unable to reach ad server ({kind}): {detail}")]
    Transport {
        kind: TransportErrorKind,
        detail: String,
    },

    /// The server answered but has no campaign for the account/campaign pair.
    #[display("Non-existent ad campaign {campaign} for account {account}")]
    EmptyCampaign { account: String, campaign: String },

    /// The campaign package or its descriptor was malformed.
    #[display("Campaign parse error: {message}")]
    Parse { message: String },

    /// Unpacking the campaign to its staging directory failed.
    #[display("Campaign staging error: {message}")]
    Staging { message: String },

    /// Settings could not be loaded or validated.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// The service was asked to start outside of an async runtime.
    #[display("Runtime error: {message}")]
    Runtime { message: String },
}

impl AdReelError {
    /// Number of breaker errors a failed fetch step counts for.
    ///
    /// A missing campaign will not fix itself quickly, so it trips the
    /// breaker at once; every other failure counts as a single error.
    #[must_use]
    pub fn severity(&self, max_errors: u32) -> u32 {
        match self {
            Self::EmptyCampaign { .. } => max_errors,
            _ => 1,
        }
    }
}
