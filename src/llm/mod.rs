//! Clients for remote generative services: the self-hosted LLaMA-3
//! instruction endpoint and the natural-language-query flow built on it.

pub mod llama;
pub mod nlq;

pub use llama::{GenerationOptions, LlamaClient};
pub use nlq::interpret_prompt;
