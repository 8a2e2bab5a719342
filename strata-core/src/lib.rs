//! Strata Core - Strongly-typed identifiers, ring tokens and limits.
//!
//! This crate provides the vocabulary shared by the routing engine and its
//! callers. It performs no routing itself.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: Prevent mixing up `HostId` with `ShardId`
//! - **Explicit limits**: Every input the router sizes from is bounded
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod token;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use token::{Range, Token};
pub use types::{ClusterVersion, HostId, ShardId};
