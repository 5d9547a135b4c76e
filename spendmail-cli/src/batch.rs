//! Batch run over a JSONL mail feed.
//!
//! Each line is one `(source_message_id, sender_address, body)` tuple from the
//! mail fetcher. Failures are counted and logged separately from emails that
//! simply are not transactions.

use anyhow::Result;
use serde::Deserialize;
use spendmail_extract::{EmailInput, Extraction, Pipeline};
use std::io::BufRead;
use tracing::{error, info};

use crate::store::{InsertOutcome, JsonlStore};

#[derive(Debug, Deserialize)]
pub struct MailItem {
    #[serde(default)]
    pub source_message_id: Option<String>,
    pub sender_address: String,
    pub body: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub extracted: usize,
    pub duplicates: usize,
    pub no_transaction: usize,
    pub failed: usize,
}

pub fn run_batch(pipeline: &Pipeline, input: impl BufRead, store: &mut JsonlStore) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    // Split on raw bytes so one badly encoded line fails alone.
    for (i, chunk) in input.split(b'\n').enumerate() {
        let lineno = i + 1;
        let line = match String::from_utf8(chunk?) {
            Ok(line) => line,
            Err(e) => {
                error!(line = lineno, error = %e, "Skipping mail item that is not UTF-8");
                summary.failed += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let item: MailItem = match serde_json::from_str(&line) {
            Ok(item) => item,
            Err(e) => {
                error!(line = lineno, error = %e, "Skipping unreadable mail item");
                summary.failed += 1;
                continue;
            }
        };

        let email = EmailInput {
            body: &item.body,
            sender_address: &item.sender_address,
            source_message_id: item.source_message_id.as_deref(),
        };

        match pipeline.extract(&email) {
            Ok(Extraction::Debit { transaction, .. }) => match store.insert_if_absent(&transaction)? {
                InsertOutcome::Inserted => summary.extracted += 1,
                InsertOutcome::Duplicate => summary.duplicates += 1,
            },
            Ok(Extraction::NoTransaction(reason)) => {
                info!(line = lineno, sender = %item.sender_address, reason = reason.label(), "No transaction");
                summary.no_transaction += 1;
            }
            Err(e) => {
                error!(
                    line = lineno,
                    sender = %item.sender_address,
                    kind = e.kind(),
                    error = %e,
                    "Extraction failed"
                );
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
