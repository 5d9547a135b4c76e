//! Issuer pattern registry
//!
//! Read-only table mapping a sender domain to the regex that recognizes that
//! issuer's spend alerts, the date format it writes, and its fixed currency.
//! Loaded from TOML:
//!
//! ```toml
//! [[issuer]]
//! domain = "hdfcbank.com"
//! currency = "INR"
//! date_format = "%d-%m-%Y"
//! pattern = '''charged\s+Rs\.\s*(?P<amount>...) at (?P<merchant>...) ... (?P<date>...)'''
//! ```

use std::collections::HashMap;
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde::{Deserialize, Serialize};
use spendmail_core::RegistryError;

const BUILTIN_ISSUERS: &str = include_str!("issuers.toml");

const REQUIRED_GROUPS: [&str; 3] = ["amount", "merchant", "date"];

/// One `[[issuer]]` entry as written in the table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssuerSpec {
    pub domain: String,
    pub currency: String,
    pub date_format: String,
    pub pattern: String,
}

#[derive(Debug, Deserialize)]
struct IssuerTable {
    #[serde(default)]
    issuer: Vec<IssuerSpec>,
}

/// A validated, compiled issuer entry
#[derive(Debug, Clone)]
pub struct IssuerPattern {
    pub domain: String,
    pub currency: String,
    pub date_format: String,
    pub regex: Regex,
}

impl IssuerPattern {
    pub fn compile(spec: IssuerSpec) -> Result<Self, RegistryError> {
        let domain = spec.domain.trim().to_ascii_lowercase();

        let regex = Regex::new(&spec.pattern).map_err(|e| RegistryError::InvalidPattern {
            domain: domain.clone(),
            reason: e.to_string(),
        })?;
        for group in REQUIRED_GROUPS {
            if !regex.capture_names().flatten().any(|n| n == group) {
                return Err(RegistryError::MissingGroup { domain, group });
            }
        }

        let currency = spec.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(RegistryError::InvalidCurrency {
                domain,
                currency: spec.currency,
            });
        }

        if StrftimeItems::new(&spec.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(RegistryError::InvalidPattern {
                domain,
                reason: format!("bad date_format {:?}", spec.date_format),
            });
        }

        Ok(Self {
            domain,
            currency,
            date_format: spec.date_format,
            regex,
        })
    }
}

/// Domain part of a sender address: everything after the last `@`, lower-cased.
pub fn sender_domain(sender: &str) -> Option<String> {
    let (_, domain) = sender.trim().rsplit_once('@')?;
    let domain = domain.trim_end_matches('>').trim().to_ascii_lowercase();
    if domain.is_empty() { None } else { Some(domain) }
}

/// Read-only lookup table of known issuers
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    issuers: HashMap<String, IssuerPattern>,
}

impl PatternRegistry {
    /// The issuer table shipped with the crate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_toml_str(BUILTIN_ISSUERS)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, RegistryError> {
        let table: IssuerTable =
            toml::from_str(s).map_err(|e| RegistryError::Parse(e.to_string()))?;

        let mut issuers = HashMap::new();
        for spec in table.issuer {
            let issuer = IssuerPattern::compile(spec)?;
            if issuers.contains_key(&issuer.domain) {
                return Err(RegistryError::DuplicateDomain(issuer.domain));
            }
            issuers.insert(issuer.domain.clone(), issuer);
        }
        Ok(Self { issuers })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&s)
    }

    /// Merge another table in; its entries replace ones with the same domain.
    pub fn extend(&mut self, other: PatternRegistry) {
        self.issuers.extend(other.issuers);
    }

    /// Issuer entry for the sender's domain, if registered.
    pub fn lookup(&self, sender: &str) -> Option<&IssuerPattern> {
        self.issuers.get(&sender_domain(sender)?)
    }

    /// Entries sorted by domain.
    pub fn issuers(&self) -> Vec<&IssuerPattern> {
        let mut out: Vec<_> = self.issuers.values().collect();
        out.sort_by(|a, b| a.domain.cmp(&b.domain));
        out
    }

    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}
