//! spendmail-core: canonical transaction record, error kinds, and the normalizer

pub mod error;
pub mod normalize;
pub mod transaction;

pub use error::{ExtractError, ItemError, RegistryError};
pub use normalize::{RawDate, RawFields, SourceMeta, normalize, parse_iso_date};
pub use transaction::{Category, DEFAULT_CURRENCY, DateSource, Transaction, TxnType};
