//! Error types shared by the extraction crates.

/// Failures propagated out of the extraction pipeline.
///
/// "No transaction" is never an error; it is an ordinary outcome. Everything
/// here is unexpected and should be logged or alerted on by the caller.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// An issuer pattern matched but a captured field could not be parsed.
    #[error("Pattern for {domain} matched but {field} is malformed: {value:?}")]
    PatternMatchedMalformed {
        domain: String,
        field: &'static str,
        value: String,
    },

    /// The classifier returned a structured call that violates the schema.
    #[error("Classifier protocol violation: {reason}")]
    ClassifierProtocol { reason: String },

    /// The classifier service could not be reached or answered with a failure.
    #[error("Classifier service {provider} unavailable: {reason}")]
    ServiceUnavailable { provider: String, reason: String },
}

impl ExtractError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ClassifierProtocol {
            reason: reason.into(),
        }
    }

    /// Short label for logging and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PatternMatchedMalformed { .. } => "pattern_matched_malformed",
            Self::ClassifierProtocol { .. } => "classifier_protocol",
            Self::ServiceUnavailable { .. } => "service_unavailable",
        }
    }
}

/// Errors raised while loading an issuer pattern table.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to parse issuer table: {0}")]
    Parse(String),

    #[error("Invalid pattern for {domain}: {reason}")]
    InvalidPattern { domain: String, reason: String },

    #[error("Pattern for {domain} is missing capture group `{group}`")]
    MissingGroup { domain: String, group: &'static str },

    #[error("Invalid currency code for {domain}: {currency:?}")]
    InvalidCurrency { domain: String, currency: String },

    #[error("Issuer domain {0} is declared more than once")]
    DuplicateDomain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when reading a stored record back.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stored amount {0} is negative")]
    NegativeAmount(rust_decimal::Decimal),

    #[error("Stored record has type {0}; only debits are kept")]
    NonDebit(crate::transaction::TxnType),
}
