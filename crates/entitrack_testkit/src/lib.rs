//! # EntiTrack Testkit
//!
//! Test utilities for EntiTrack.
//!
//! This crate provides:
//! - The canonical catalog fixture model and a [`TestGraph`] wrapper
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entitrack_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_graph() {
//!     let mut graph = TestGraph::new();
//!     let category = graph.tracked_category(1);
//!     // ... mutate and assert
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
