//! Fast-path matcher: issuer regex applied to an email body.
//!
//! A hit is trusted to be a spend confirmation, so the classifier is skipped.
//! A miss (unknown domain or no regex match) defers to the classifier. A match
//! whose captured amount or date cannot be parsed is an error, never a miss.

use std::str::FromStr;

use chrono::NaiveDate;
use regex::Captures;
use rust_decimal::Decimal;
use spendmail_core::{ExtractError, RawDate, RawFields, TxnType};
use tracing::debug;

use crate::registry::{IssuerPattern, PatternRegistry};

/// Fields extracted by an issuer pattern
#[derive(Debug, Clone, PartialEq)]
pub struct FastPathHit {
    pub domain: String,
    pub fields: RawFields,
}

/// Try the registered issuer pattern for `sender` against `body`.
pub fn match_fast_path(
    registry: &PatternRegistry,
    sender: &str,
    body: &str,
) -> Result<Option<FastPathHit>, ExtractError> {
    let Some(issuer) = registry.lookup(sender) else {
        return Ok(None);
    };
    let Some(caps) = issuer.regex.captures(body) else {
        debug!(domain = %issuer.domain, "Issuer pattern did not match");
        return Ok(None);
    };

    let fields = extract_fields(issuer, &caps)?;
    Ok(Some(FastPathHit {
        domain: issuer.domain.clone(),
        fields,
    }))
}

fn extract_fields(issuer: &IssuerPattern, caps: &Captures<'_>) -> Result<RawFields, ExtractError> {
    let malformed = |field: &'static str, value: &str| ExtractError::PatternMatchedMalformed {
        domain: issuer.domain.clone(),
        field,
        value: value.to_string(),
    };

    let amount_raw = caps.name("amount").map(|m| m.as_str()).unwrap_or("");
    let amount = Decimal::from_str(amount_raw.replace(',', "").trim())
        .map_err(|_| malformed("amount", amount_raw))?;

    let date_raw = caps.name("date").map(|m| m.as_str()).unwrap_or("");
    let date = NaiveDate::parse_from_str(date_raw.trim(), &issuer.date_format)
        .map_err(|_| malformed("date", date_raw))?;

    Ok(RawFields {
        date: RawDate::Parsed(date),
        amount,
        currency: Some(issuer.currency.clone()),
        txn_type: TxnType::Debit.as_str().to_string(),
        merchant: caps.name("merchant").map(|m| m.as_str().to_string()),
        category: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOSE: &str = r#"
[[issuer]]
domain = "loose.example"
currency = "GBP"
date_format = "%d/%m/%Y"
pattern = '''spent\s+(?P<amount>[\d,.x]+)\s+at\s+(?P<merchant>\w+)\s+on\s+(?P<date>\S+)'''
"#;

    fn hdfc() -> PatternRegistry {
        PatternRegistry::builtin().unwrap()
    }

    #[test]
    fn test_hdfc_alert() {
        let body = "Dear Customer, your HDFC Bank Credit Card ending 1234 has been \
                    charged Rs. 4,578.90 at AMAZON RETAIL on 30-06-2025. If not you, call us.";
        let hit = match_fast_path(&hdfc(), "alerts@hdfcbank.com", body).unwrap().unwrap();
        assert_eq!(hit.domain, "hdfcbank.com");
        assert_eq!(hit.fields.amount, Decimal::from_str("4578.90").unwrap());
        assert_eq!(hit.fields.currency.as_deref(), Some("INR"));
        assert_eq!(hit.fields.txn_type, "debit");
        assert_eq!(hit.fields.merchant.as_deref().map(str::trim), Some("AMAZON RETAIL"));
        assert_eq!(
            hit.fields.date,
            RawDate::Parsed(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap())
        );
    }

    #[test]
    fn test_multiline_body() {
        let body = "Transaction alert\ncharged Rs. 120.00 at SWIGGY\nDate: 01-07-2025\n";
        let hit = match_fast_path(&hdfc(), "alerts@HDFCBANK.com", body).unwrap().unwrap();
        assert_eq!(hit.fields.amount, Decimal::from_str("120.00").unwrap());
        assert_eq!(hit.fields.merchant.as_deref().map(str::trim), Some("SWIGGY"));
    }

    #[test]
    fn test_mixed_case_merchants_kept_whole() {
        for (merchant, want) in [
            ("Swiggy", "Swiggy"),
            ("Amazon.in", "Amazon.in"),
            ("McDONALDS", "McDONALDS"),
            ("Swiggy Instamart", "Swiggy Instamart"),
            ("7-Eleven", "7-Eleven"),
        ] {
            let body = format!("charged Rs. 120.00 at {merchant} on 01-07-2025");
            let hit = match_fast_path(&hdfc(), "alerts@hdfcbank.com", &body).unwrap().unwrap();
            assert_eq!(hit.fields.merchant.as_deref(), Some(want), "{body}");
            assert_eq!(
                hit.fields.date,
                RawDate::Parsed(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap())
            );
        }
    }

    #[test]
    fn test_merchant_stops_before_filler() {
        let body = "charged Rs. 4,578.90 at AMAZON RETAIL ... 30-06-2025. Not you?";
        let hit = match_fast_path(&hdfc(), "alerts@hdfcbank.com", body).unwrap().unwrap();
        assert_eq!(hit.fields.merchant.as_deref(), Some("AMAZON RETAIL"));
    }

    #[test]
    fn test_unknown_domain_defers() {
        let body = "charged Rs. 4,578.90 at AMAZON on 30-06-2025";
        assert!(match_fast_path(&hdfc(), "noreply@bank.com", body).unwrap().is_none());
    }

    #[test]
    fn test_non_matching_body_defers() {
        let body = "Your statement for June is ready.";
        assert!(match_fast_path(&hdfc(), "alerts@hdfcbank.com", body).unwrap().is_none());
    }

    #[test]
    fn test_impossible_date_is_error() {
        let body = "charged Rs. 10.00 at CAFE on 31-02-2025";
        let err = match_fast_path(&hdfc(), "alerts@hdfcbank.com", body).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::PatternMatchedMalformed { field: "date", .. }
        ));
    }

    #[test]
    fn test_malformed_amount_is_error() {
        let reg = PatternRegistry::from_toml_str(LOOSE).unwrap();
        let err = match_fast_path(&reg, "card@loose.example", "spent 1,2x.00 at TESCO on 01/07/2025")
            .unwrap_err();
        match err {
            ExtractError::PatternMatchedMalformed { domain, field, value } => {
                assert_eq!(domain, "loose.example");
                assert_eq!(field, "amount");
                assert_eq!(value, "1,2x.00");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_custom_issuer_date_format() {
        let reg = PatternRegistry::from_toml_str(LOOSE).unwrap();
        let hit = match_fast_path(&reg, "card@loose.example", "spent 1,050.25 at TESCO on 02/07/2025")
            .unwrap()
            .unwrap();
        assert_eq!(hit.fields.amount, Decimal::from_str("1050.25").unwrap());
        assert_eq!(hit.fields.currency.as_deref(), Some("GBP"));
        assert_eq!(
            hit.fields.date,
            RawDate::Parsed(NaiveDate::from_ymd_opt(2025, 7, 2).unwrap())
        );
    }
}
