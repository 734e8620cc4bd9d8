//! msgbridge - block-structured chat API in front of OpenAI-compatible backends
//!
//! This library provides the request/response translator, the HTTP
//! pipeline around it, and the configuration it runs from.

pub mod config;
pub mod error;
pub mod proxy;

pub use config::Config;
pub use error::{Error, Result};
