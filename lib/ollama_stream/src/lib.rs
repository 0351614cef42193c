//! Minimal streaming client for the HTTP API of a local Ollama server.
//!
//! `Client::generate` streams the newline-delimited JSON records of
//! `/api/generate`, and `Client::models` lists the installed models.

pub mod client;
pub mod error;
pub mod generate;
pub mod models;

pub use client::{Client, ClientConfig};
pub use error::Error;
pub use generate::{GenerateBody, Record};

pub type Json = serde_json::Value;
