//! Langbase Pipes API client.
//!
//! Each LLM capability is served by its own pipe; [`LangbaseClient`] runs
//! pipes with retry and makes sure they exist at startup.

mod client;
mod types;


pub use client::LangbaseClient;
pub use types::{
    extract_json_from_completion, CreatePipeRequest, CreatePipeResponse, Message, MessageRole,
    PipeRequest, PipeResponse, PipeTemplate, RawResponse, Usage,
};
