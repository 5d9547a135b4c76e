//! Per-email orchestration: fast path, then classifier, then normalizer.
//!
//! Each call is independent. The only shared state is the read-only
//! [`PatternRegistry`] and the injected [`ClassifierClient`].

use chrono::{DateTime, Utc};
use spendmail_core::{ExtractError, SourceMeta, Transaction, normalize};
use spendmail_ingest::{PatternRegistry, match_fast_path};
use tracing::{debug, info, warn};

use crate::classifier::{Classification, ClassifierClient};

/// One candidate email as handed over by the mail fetcher
#[derive(Debug, Clone, Copy)]
pub struct EmailInput<'a> {
    pub body: &'a str,
    pub sender_address: &'a str,
    pub source_message_id: Option<&'a str>,
}

impl<'a> EmailInput<'a> {
    pub fn new(body: &'a str, sender_address: &'a str) -> Self {
        Self {
            body,
            sender_address,
            source_message_id: None,
        }
    }

    pub fn with_message_id(mut self, id: &'a str) -> Self {
        self.source_message_id = Some(id);
        self
    }

    fn source(&self) -> SourceMeta<'a> {
        SourceMeta::new(self.sender_address, self.body, self.source_message_id)
    }
}

/// Why an email produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTransactionReason {
    /// The classifier made no structured call.
    NoStructuredCall,
    /// The classifier's structured call carried no arguments.
    MissingArguments,
    /// The extracted fields described a credit (or other non-debit).
    NonDebit,
}

impl NoTransactionReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoStructuredCall => "no_structured_call",
            Self::MissingArguments => "missing_arguments",
            Self::NonDebit => "non_debit",
        }
    }
}

/// Which path produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    FastPath,
    Classifier,
}

/// Business outcome for one email
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    NoTransaction(NoTransactionReason),
    Debit {
        transaction: Transaction,
        path: ExtractionPath,
    },
}

impl Extraction {
    pub fn into_transaction(self) -> Option<Transaction> {
        match self {
            Extraction::Debit { transaction, .. } => Some(transaction),
            Extraction::NoTransaction(_) => None,
        }
    }

    pub fn is_debit(&self) -> bool {
        matches!(self, Extraction::Debit { .. })
    }
}

/// Email -> transaction pipeline
#[derive(Clone)]
pub struct Pipeline {
    registry: PatternRegistry,
    classifier: ClassifierClient,
}

impl Pipeline {
    pub fn new(registry: PatternRegistry, classifier: ClassifierClient) -> Self {
        Self {
            registry,
            classifier,
        }
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn extract(&self, email: &EmailInput<'_>) -> Result<Extraction, ExtractError> {
        self.extract_at(email, Utc::now())
    }

    /// Same as [`Pipeline::extract`] with an explicit clock for `created_at`
    /// and the fallback date.
    pub fn extract_at(
        &self,
        email: &EmailInput<'_>,
        now: DateTime<Utc>,
    ) -> Result<Extraction, ExtractError> {
        let source = email.source();

        if let Some(hit) = match_fast_path(&self.registry, email.sender_address, email.body)? {
            return Ok(match normalize(hit.fields, &source, now) {
                Some(transaction) => {
                    info!(domain = %hit.domain, id = %transaction.id(), "Fast path matched");
                    Extraction::Debit {
                        transaction,
                        path: ExtractionPath::FastPath,
                    }
                }
                None => Extraction::NoTransaction(NoTransactionReason::NonDebit),
            });
        }

        let fields = match self.classifier.classify(email.body)? {
            Classification::NoStructuredCall => {
                debug!(sender = %email.sender_address, "Classifier found no transaction");
                return Ok(Extraction::NoTransaction(NoTransactionReason::NoStructuredCall));
            }
            Classification::MissingArguments => {
                warn!(sender = %email.sender_address, "Classifier call had no arguments");
                return Ok(Extraction::NoTransaction(NoTransactionReason::MissingArguments));
            }
            Classification::Fields(fields) => fields,
        };

        let Some(transaction) = normalize(fields, &source, now) else {
            debug!(sender = %email.sender_address, "Classifier result is not a debit");
            return Ok(Extraction::NoTransaction(NoTransactionReason::NonDebit));
        };

        if transaction.used_fallback_date() {
            warn!(id = %transaction.id(), sender = %email.sender_address, "Record uses fallback date");
        }
        info!(
            id = %transaction.id(),
            provider = self.classifier.provider(),
            category = %transaction.category(),
            "Classifier extracted debit"
        );
        Ok(Extraction::Debit {
            transaction,
            path: ExtractionPath::Classifier,
        })
    }

    /// `Some(record)` for a confirmed spend, `None` for anything else.
    pub fn extract_transaction(
        &self,
        body: &str,
        sender_address: &str,
        source_message_id: Option<&str>,
    ) -> Result<Option<Transaction>, ExtractError> {
        let email = EmailInput {
            body,
            sender_address,
            source_message_id,
        };
        Ok(self.extract(&email)?.into_transaction())
    }
}
