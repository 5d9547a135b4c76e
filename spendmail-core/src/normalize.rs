//! Normalizer: raw extracted fields -> canonical [`Transaction`].
//!
//! Both extraction paths (issuer pattern and classifier) converge here. This
//! is the single place where the debit-only policy is enforced.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transaction::{Category, DEFAULT_CURRENCY, DateSource, Transaction, TxnType};

/// Namespace for record identifiers derived from source data
pub const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c52_8d0e_4b7a_9e21_54c3_0f8d_b617);

/// Date as delivered by an extraction path
#[derive(Debug, Clone, PartialEq)]
pub enum RawDate {
    /// Already parsed with an issuer-specific format
    Parsed(NaiveDate),
    /// ISO-8601 text that still needs parsing
    Text(String),
}

/// Fields pulled out of an email before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawFields {
    pub date: RawDate,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub txn_type: String,
    pub merchant: Option<String>,
    pub category: Option<Category>,
}

/// Where an email came from
#[derive(Debug, Clone, Copy)]
pub struct SourceMeta<'a> {
    pub sender_address: &'a str,
    pub source_message_id: Option<&'a str>,
    pub body: &'a str,
}

impl<'a> SourceMeta<'a> {
    pub fn new(sender_address: &'a str, body: &'a str, source_message_id: Option<&'a str>) -> Self {
        Self {
            sender_address,
            source_message_id,
            body,
        }
    }

    /// Stable record identifier.
    ///
    /// Mailbox UIDs are only unique per mailbox, so the sender is mixed in.
    /// Without a message id the email content is hashed instead.
    pub fn record_id(&self) -> Uuid {
        let key = match self.source_message_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(mid) => format!("message:{}\n{}", self.sender_address, mid),
            None => format!("content:{}\n{}", self.sender_address, self.body),
        };
        Uuid::new_v5(&RECORD_ID_NAMESPACE, key.as_bytes())
    }
}

/// Parse ISO-8601 date text, accepting a bare date or a date-time.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

/// Build the canonical record, or `None` when the fields are not a debit.
///
/// `now` supplies both `created_at` and the fallback date.
pub fn normalize(raw: RawFields, source: &SourceMeta<'_>, now: DateTime<Utc>) -> Option<Transaction> {
    if raw.txn_type.parse::<TxnType>() != Ok(TxnType::Debit) {
        debug!(txn_type = %raw.txn_type, "Discarding non-debit fields");
        return None;
    }

    let (date, date_source) = match raw.date {
        RawDate::Parsed(d) => (d, DateSource::Parsed),
        RawDate::Text(text) => match parse_iso_date(&text) {
            Some(d) => (d, DateSource::Parsed),
            None => {
                let fallback = now.date_naive();
                warn!(raw_date = %text, fallback = %fallback, "Unparseable date, using current UTC date");
                (fallback, DateSource::Fallback)
            }
        },
    };

    let currency = raw
        .currency
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let merchant = raw.merchant.map(|m| m.trim().to_string()).unwrap_or_default();

    Some(Transaction::new(
        source.record_id(),
        date,
        date_source,
        raw.amount,
        currency,
        merchant,
        raw.category.unwrap_or_default(),
        source.sender_address.to_string(),
        source.source_message_id.unwrap_or_default().to_string(),
        now,
    ))
}
