mod analyzer;
mod client;
mod probe;

pub use analyzer::FocusAnalyzer;
pub use client::{ChatMessage, MessageContent, OpenAiModelClient, RemoteModel, REQUEST_TIMEOUT};
pub use probe::{CapabilityProbe, ProbeReport};
