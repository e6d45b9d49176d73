//! core
//!
//! Core domain types, pure arithmetic, verification and operation
//! bookkeeping for nested sets.
//!
//! # Modules
//!
//! - [`types`] - Strong types: NodeId, Scope, Placement, Node, Position
//! - [`bounds`] - Bounds arithmetic for inserts and moves
//! - [`verify`] - Verification of nested-set invariants
//! - [`ops`] - Operation journaling and scope locking
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Nothing in `core` talks to a store
//! - All verification is deterministic

pub mod bounds;
pub mod config;
pub mod ops;
pub mod types;
pub mod verify;
