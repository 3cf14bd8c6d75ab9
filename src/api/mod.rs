//! HTTP client for the Xinference control API.
//!
//! Two calls are needed during bootstrap: `GET /v1/models` as a readiness
//! check and `POST /v1/models` to launch a model.

mod client;
mod launch;
mod status;
mod types;

pub use client::XinferenceClient;
