//! Collaborator contracts the renewal engine consumes but does not own.
//!
//! Each trait is deliberately narrow: the hidden-iframe navigator, the ID-token verifier, and
//! the transaction store are supplied by the embedding application. Small in-crate
//! implementations exist where they are useful outside a browser.

pub mod silent_auth;
pub mod transaction;
pub mod verifier;

pub use silent_auth::*;
pub use transaction::*;
pub use verifier::*;
