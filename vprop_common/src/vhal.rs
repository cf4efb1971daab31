//! Vehicle property abstraction: data model, transport boundary,
//! handler contract and errors.

pub mod config;
pub mod consts;
pub mod error;
pub mod handler;
pub mod props;
pub mod transport;
pub mod types;
