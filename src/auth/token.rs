//! Token secrets, cached token-set entries, and caller-facing token responses.

pub mod entry;
pub mod response;
pub mod secret;
