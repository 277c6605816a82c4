pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod gemini;
pub mod knowledge_base;
pub mod lexical;
pub mod mcp_api;
pub mod model;
pub mod pipeline;
pub mod retry;
pub mod selector;
