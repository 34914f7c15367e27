//! SupportDesk Shared Types and Utilities
//!
//! Types, wire schemas and the proxy-token scheme used by both the server
//! and the end-user side of SupportDesk.

pub mod error;
pub mod secure;
pub mod types;
pub mod wire;

pub use error::*;
pub use types::*;
pub use wire::*;
