//! Wire types for the wrapped terminal API.
//!
//! This crate contains the serde-serializable values exchanged with the
//! terminal API: call arguments, `(code, description)` error tuples, account
//! and terminal snapshots, and initialization requests.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with the wrapped API: Field names and tuple shapes match what the terminal returns
//! * Stable: Changes only when the wrapped API changes
//!
//! Isolation and dispatch are built on top of these types in `mtplex`.

pub mod account;
pub mod call;
pub mod init;
pub mod last_error;
pub mod terminal;

pub use account::*;
pub use call::*;
pub use init::*;
pub use last_error::*;
pub use terminal::*;
