//! Request-scoped authorization for operations arriving over HTTP, query
//! resolvers, persistent sockets and RPC.
//!
//! Each operation may declare an action and subject type (see [`metadata`]).
//! For every invocation of such an operation the [`guard::AclGuard`] extracts
//! the caller's principal, builds a fresh [`ability::Ability`] from the
//! configured rules, optionally resolves the concrete subject through a
//! [`hook::SubjectHook`], and decides.

pub mod ability;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod hook;
pub mod logs;
pub mod metadata;
pub mod principal;

mod utils;
