//! vprop Common Library
//!
//! Shared vehicle property types and contracts for the vprop workspace.
//!
//! # Module Structure
//!
//! - [`vhal`] - Property data model, transport boundary, handler contract, errors
//! - [`bimap`] - Bidirectional id lookup used by domain handlers
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use vprop_common::prelude::*;
//!
//! let value = PropertyValue::new(0x11600207, GLOBAL_AREA, 0, Value::Float(12.5));
//! assert_eq!(value.value.shape(), ValueShape::Float);
//! ```

pub mod bimap;
pub mod config;
pub mod prelude;
pub mod vhal;
