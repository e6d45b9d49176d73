//! nestedset - hierarchies stored as nested sets
//!
//! Every node of a tree carries a `left` and `right` bound; a node's
//! descendants are exactly the rows whose bounds lie between its own. A
//! forest is split into independent trees by a `scope` value, and each
//! tree is numbered `1..=2n` on its own.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Tree operations, queries, rebuild, rollback
//! - [`store`] - The row store contract and its memory and file backends
//! - [`core`] - Domain types, bounds arithmetic, verification, config
//!
//! # Correctness Invariants
//!
//! 1. Within a scope, bounds are numbered `1..=2n` without gaps
//! 2. Any two nodes of a scope are either nested or disjoint
//! 3. All bounds changes flow through the engine's space primitives
//! 4. A failed operation leaves its scopes exactly as they were

pub mod cli;
pub mod core;
pub mod engine;
pub mod store;
