//! LLM provider transports.
//!
//! Nearly every hosted LLM speaks the OpenAI `/chat/completions` dialect,
//! so a single OpenAI-compatible client covers OpenAI, OpenRouter, Zhipu,
//! Groq, DeepSeek, Ollama, vLLM, and friends.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
