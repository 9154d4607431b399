//! HTTP clients and typed payloads for the outbreak backend and the public
//! data sources, plus the resource catalogue wiring them into the cache.

pub mod api_types;
pub mod client;
pub mod public;
pub mod resources;
pub mod types;

#[cfg(test)]
mod test_server;

pub use client::BackendClient;
pub use public::PublicClient;
pub use resources::{Catalogue, ResourceKey};
