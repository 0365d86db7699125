//! Policy evaluation against an Open Policy Agent endpoint.

mod client;
mod input;

pub use client::{PolicyClient, PolicyConfig, DEFAULT_POLICY_TIMEOUT};
pub use input::{parse_query, path_segments, PolicyInput};
