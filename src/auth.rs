//! Auth-domain identifiers, scope sets, decoded claims, and cached token models.

pub mod claims;
pub mod id;
pub mod scope;
pub mod token;

pub use claims::*;
pub use id::*;
pub use scope::*;
pub use token::{entry::*, response::*, secret::*};
