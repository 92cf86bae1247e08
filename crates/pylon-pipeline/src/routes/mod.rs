//! Built-in endpoints, present in every pipeline.

mod ok;

pub use ok::ok;

/// Name under which the health endpoint is registered.
pub const OK_ENDPOINT: &str = "ok";
