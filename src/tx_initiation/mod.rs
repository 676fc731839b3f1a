//! Signing and submission of chain messages.

pub mod error;
pub mod nonce;
pub mod submitter;
