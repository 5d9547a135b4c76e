//! Canonical transaction record produced by the extraction pipeline

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ItemError;

/// Currency used when the source does not name one
pub const DEFAULT_CURRENCY: &str = "USD";

/// A confirmed spend, normalized into the shape handed to storage.
///
/// Records are only built by [`crate::normalize`] (or read back from storage
/// with [`Transaction::from_item`]) and expose read-only accessors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    id: Uuid,
    date: NaiveDate,
    amount: Decimal,
    currency: String,
    #[serde(rename = "type")]
    txn_type: TxnType,
    merchant: String,
    category: Category,
    source_address: String,
    source_message_id: String,
    created_at: DateTime<Utc>,
    /// Whether `date` came from the source text or the fallback clock.
    #[serde(skip)]
    date_source: DateSource,
}

/// Direction of money movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TxnType {
    #[serde(rename = "debit")]
    Debit,
    #[serde(rename = "credit")]
    Credit,
}

impl TxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::Debit => "debit",
            TxnType::Credit => "credit",
        }
    }
}

impl FromStr for TxnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debit" => Ok(TxnType::Debit),
            "credit" => Ok(TxnType::Credit),
            other => Err(format!("unknown transaction type {other:?}")),
        }
    }
}

impl fmt::Display for TxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spend categories accepted from the classifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Groceries,
    Dining,
    Utilities,
    Transportation,
    Entertainment,
    Health,
    Subscriptions,
    Shopping,
    Travel,
    Income,
    Investment,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Groceries,
        Category::Dining,
        Category::Utilities,
        Category::Transportation,
        Category::Entertainment,
        Category::Health,
        Category::Subscriptions,
        Category::Shopping,
        Category::Travel,
        Category::Income,
        Category::Investment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Groceries => "groceries",
            Category::Dining => "dining",
            Category::Utilities => "utilities",
            Category::Transportation => "transportation",
            Category::Entertainment => "entertainment",
            Category::Health => "health",
            Category::Subscriptions => "subscriptions",
            Category::Shopping => "shopping",
            Category::Travel => "travel",
            Category::Income => "income",
            Category::Investment => "investment",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown category {s:?}"))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record's date came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSource {
    #[default]
    Parsed,
    /// Source date was unparseable; the current UTC date was substituted.
    Fallback,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: Uuid,
        date: NaiveDate,
        date_source: DateSource,
        amount: Decimal,
        currency: String,
        merchant: String,
        category: Category,
        source_address: String,
        source_message_id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            date,
            amount: amount.abs(),
            currency,
            txn_type: TxnType::Debit,
            merchant,
            category,
            source_address,
            source_message_id,
            created_at,
            date_source,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn txn_type(&self) -> TxnType {
        self.txn_type
    }

    pub fn merchant(&self) -> &str {
        &self.merchant
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    pub fn source_message_id(&self) -> &str {
        &self.source_message_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn date_source(&self) -> DateSource {
        self.date_source
    }

    /// True when the date was substituted because the source date was unusable
    pub fn used_fallback_date(&self) -> bool {
        self.date_source == DateSource::Fallback
    }

    /// Storage item: ISO date, decimal-string amount, RFC 3339 `created_at`.
    pub fn to_item(&self) -> Result<serde_json::Value, ItemError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Read a record back from its storage item.
    pub fn from_item(item: serde_json::Value) -> Result<Self, ItemError> {
        let txn: Transaction = serde_json::from_value(item)?;
        if txn.amount.is_sign_negative() {
            return Err(ItemError::NegativeAmount(txn.amount));
        }
        if txn.txn_type != TxnType::Debit {
            return Err(ItemError::NonDebit(txn.txn_type));
        }
        Ok(txn)
    }
}
