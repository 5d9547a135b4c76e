//! spendmail-ingest: issuer pattern registry and the regex fast path for known senders.

pub mod fast_path;
pub mod registry;

pub use fast_path::{FastPathHit, match_fast_path};
pub use registry::{IssuerPattern, IssuerSpec, PatternRegistry, sender_domain};
