//! spendmail-extract: classifier client, OpenAI-compatible backend, and the
//! per-email extraction pipeline

pub mod classifier;
pub mod openai;
pub mod pipeline;

pub use classifier::{
    ChatBackend, ChatRequest, ChatResponse, Classification, ClassifierClient, FunctionCall,
    MAX_BODY_CHARS,
};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use pipeline::{EmailInput, Extraction, ExtractionPath, NoTransactionReason, Pipeline};
