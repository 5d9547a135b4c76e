//! Classifier client: fallback extraction through a function-calling model.
//!
//! The model is told to emit exactly one `extract_transaction` call for a
//! confirmed outgoing spend and no call for anything else. The presence of
//! that call is the only signal used; reply text is never inspected for
//! control flow.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value, json};
use spendmail_core::{Category, ExtractError, RawDate, RawFields};
use tracing::debug;

/// Longest body (in characters) sent to the classifier; the tail is dropped.
pub const MAX_BODY_CHARS: usize = 8000;

/// Minimum temperature so identical input gives identical output.
pub const TEMPERATURE: f32 = 0.0;

pub const FUNCTION_NAME: &str = "extract_transaction";

pub const SYSTEM_PROMPT: &str = "You are a strict financial parsing engine. Given an email body, you must:
1. If the message confirms an OUTGOING SPEND/CHARGE (money leaving the user, e.g. a credit-card purchase, ATM withdrawal, bill payment), extract ONLY the first such transaction and respond by calling the function `extract_transaction` with JSON arguments that match the schema. Mark it with `type = \"debit\"`.
2. Ignore deposits, refunds, salary credits, statement summaries, reward points/miles notifications, promotions, newsletters, and any message that does NOT confirm money being spent. For those, DO NOT call any function and reply with the literal string `NO_TRANSACTION`.";

const REQUIRED_FIELDS: [&str; 4] = ["date", "amount", "type", "category"];

/// Function schema offered to the model
pub fn transaction_schema() -> Value {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    json!({
        "name": FUNCTION_NAME,
        "description": "Extract the first monetary transaction mentioned in the input text and classify its spending category.",
        "parameters": {
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "YYYY-MM-DD date of the transaction"},
                "amount": {"type": "number"},
                "currency": {"type": "string", "description": "ISO 4217 code, e.g. USD"},
                "type": {"type": "string", "enum": ["debit", "credit"]},
                "merchant": {"type": "string"},
                "category": {"type": "string", "enum": categories},
            },
            "required": REQUIRED_FIELDS,
        },
    })
}

/// What is sent to the chat backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub function: Value,
    pub temperature: f32,
}

/// A structured call returned by the model
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON argument text, as sent by the model.
    pub arguments: Option<String>,
}

/// What came back from the chat backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatResponse {
    pub function_call: Option<FunctionCall>,
    /// Free text reply. Kept for logs only.
    pub text: Option<String>,
}

/// Transport to a function-calling model.
///
/// Implementations perform one blocking request and never retry.
pub trait ChatBackend: Send + Sync {
    /// Provider name used in logs and errors.
    fn provider(&self) -> &str;

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ExtractError>;
}

/// Outcome of asking the classifier about one email
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// The model made no structured call.
    NoStructuredCall,
    /// A structured call came back without an arguments payload.
    MissingArguments,
    /// Validated fields from the structured call (may still be non-debit).
    Fields(RawFields),
}

/// Builds the fixed classifier request and interprets the reply
#[derive(Clone)]
pub struct ClassifierClient {
    backend: Arc<dyn ChatBackend>,
}

impl ClassifierClient {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub fn provider(&self) -> &str {
        self.backend.provider()
    }

    /// Request sent for `body`, after truncation.
    pub fn build_request(body: &str) -> ChatRequest {
        ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: truncate_chars(body, MAX_BODY_CHARS).to_string(),
            function: transaction_schema(),
            temperature: TEMPERATURE,
        }
    }

    pub fn classify(&self, body: &str) -> Result<Classification, ExtractError> {
        let request = Self::build_request(body);
        if request.user.len() < body.len() {
            debug!(
                original_chars = body.chars().count(),
                sent_chars = MAX_BODY_CHARS,
                "Truncated email body for classifier"
            );
        }

        let response = self.backend.complete(&request)?;
        if let Some(text) = response.text.as_deref().filter(|t| !t.trim().is_empty()) {
            debug!(provider = self.provider(), text = %text.trim(), "Classifier reply text");
        }

        let Some(call) = response.function_call else {
            return Ok(Classification::NoStructuredCall);
        };
        if call.name != FUNCTION_NAME {
            return Err(ExtractError::protocol(format!(
                "unexpected function {:?}",
                call.name
            )));
        }
        match call.arguments.as_deref().map(str::trim) {
            None | Some("") => Ok(Classification::MissingArguments),
            Some(args) => parse_arguments(args).map(Classification::Fields),
        }
    }
}

/// Longest prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Validate a structured call's argument JSON against the schema.
pub fn parse_arguments(args: &str) -> Result<RawFields, ExtractError> {
    let value: Value = serde_json::from_str(args)
        .map_err(|e| ExtractError::protocol(format!("arguments are not valid JSON: {e}")))?;
    let Value::Object(obj) = value else {
        return Err(ExtractError::protocol("arguments are not a JSON object"));
    };

    for field in REQUIRED_FIELDS {
        if obj.get(field).is_none_or(Value::is_null) {
            return Err(ExtractError::protocol(format!("missing required field `{field}`")));
        }
    }

    let date = required_str(&obj, "date")?;
    let txn_type = required_str(&obj, "type")?;
    let category_raw = required_str(&obj, "category")?;
    let category = Category::from_str(&category_raw).map_err(ExtractError::protocol)?;
    let amount = parse_amount(&obj["amount"])?;

    let currency = optional_str(&obj, "currency")?
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty());
    if let Some(c) = &currency {
        if c.len() != 3 || !c.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ExtractError::protocol(format!("invalid currency code {c:?}")));
        }
    }

    Ok(RawFields {
        date: RawDate::Text(date),
        amount,
        currency,
        txn_type,
        merchant: optional_str(&obj, "merchant")?,
        category: Some(category),
    })
}

fn required_str(obj: &Map<String, Value>, field: &str) -> Result<String, ExtractError> {
    optional_str(obj, field)?
        .ok_or_else(|| ExtractError::protocol(format!("missing required field `{field}`")))
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, ExtractError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ExtractError::protocol(format!(
            "field `{field}` should be a string, got {other}"
        ))),
    }
}

fn parse_amount(value: &Value) -> Result<Decimal, ExtractError> {
    let bad = || ExtractError::protocol(format!("amount {value} is not a number"));
    let text = match value {
        Value::Number(n) => n.to_string(),
        // Models occasionally quote numbers.
        Value::String(s) => s.trim().replace(',', ""),
        _ => return Err(bad()),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| bad())
}
