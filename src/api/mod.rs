//! The BIB/SBC HTTP surface: [`client::ApiClient`] plus the nonce generator
//! it needs to authenticate requests.

pub mod client;
pub mod nonce;

pub use client::{ApiClient, NecImageRef, ServerType};
