//! # EntiORM Testkit
//!
//! Test utilities for EntiORM.
//!
//! This crate provides:
//! - A library domain catalog and an identity-map backed [`Library`]
//! - Property-based test generators using proptest
//! - Cross-crate integration scenarios, including a builder fragment
//!   evaluator for backend parity checks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entiorm_testkit::prelude::*;
//!
//! #[test]
//! fn test_author_lookup() {
//!     let library = scenarios::seeded_library();
//!     let book = library.get("Book", 1);
//!     assert!(book.write().get_entity("author").unwrap().is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
