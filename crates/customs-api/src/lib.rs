//! HTTP side of the pedimento engine.
//!
//! `RestRegistry` speaks the customs backend's `procesamientopedimentos`
//! resource, `HttpServiceInvoker` calls the dependent partidas/remesas/acuse
//! endpoints, and `HttpCompletionProcessor` forwards the primary request to
//! the external pedimento-completo processor.

mod client;
mod error;
mod registry;
mod services;
mod wire;

pub use client::CustomsClient;
pub use error::ApiError;
pub use registry::RestRegistry;
pub use services::{HttpCompletionProcessor, HttpServiceInvoker};
