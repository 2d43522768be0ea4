//! Streaming text-generation client (SSE over HTTP).

pub mod client;
