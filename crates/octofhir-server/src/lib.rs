//! OctoFHIR webhook management server.
//!
//! Exposes the [`octofhir_webhooks`] registry, delivery log and retry
//! operations over a JSON HTTP API.

pub mod config;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use error::{ApiError, OperationOutcome};
pub use server::{OctofhirServer, ServerBuilder, build_app};
