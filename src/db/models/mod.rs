//! Database models split into domain-specific modules.

pub mod access;
pub mod document;
pub mod profile;
pub mod user;

pub use access::*;
pub use document::*;
pub use profile::*;
pub use user::*;
