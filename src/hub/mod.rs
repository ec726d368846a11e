pub mod client;
pub mod details;
pub mod signature;

pub use client::{HubClient, HubError, HubMode, HubResponse, WebSubHub};
