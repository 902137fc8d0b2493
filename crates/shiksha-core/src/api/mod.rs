//! REST API client module for the Shiksha Leap server.
//!
//! Endpoints live under `/api/` and speak JSON. Authentication is a session
//! cookie set by `verify-code`; the cookie jar lives in the `HttpFetcher`.

pub mod client;
pub mod error;

pub use client::{ApiClient, MessageResponse, VerifyResponse};
pub use error::ApiError;
