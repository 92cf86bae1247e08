//! # Pylon Core
//!
//! Core types shared by every crate in the Pylon endpoint pipeline.
//!
//! This crate provides the foundational types used throughout Pylon:
//!
//! - [`ApiError`] / [`ApiStatus`] - Typed, classifiable failures with a symbolic status
//! - [`CallError`] - Everything an endpoint, hook or middleware can fail with
//! - [`EndpointOutput`] - The value a handler or hook produces
//! - [`Reply`] - A successful call result with its accumulated headers
//! - [`cookie`] - Cookie parsing, `Set-Cookie` building and HMAC signing
//! - [`Adapter`] - Storage adapter contract plus the in-memory [`MemoryAdapter`]
//! - [`generate_id`] - Default random identifier generation

#![doc(html_root_url = "https://docs.rs/pylon-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod cookie;
mod error;
mod id;
mod reply;
mod response;

pub use adapter::{Adapter, AdapterError, MemoryAdapter, Record, Where};
pub use error::{ApiError, ApiStatus, CallError, CallResult};
pub use id::{generate_id, DEFAULT_ID_SIZE};
pub use reply::{merge_headers, Reply};
pub use response::{json_response, BoxFuture, EndpointOutput, Request, Response};
