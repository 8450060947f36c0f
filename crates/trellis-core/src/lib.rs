//! trellis-core: Shared vocabulary, configuration, and error handling for Trellis.
//!
//! This crate provides the foundational types used across all Trellis crates:
//! - The closed sets of labels, properties and relationship types
//! - Session and authorized-user records
//! - Configuration management
//! - The `DataError` taxonomy

pub mod config;
pub mod error;
pub mod types;

pub use error::{DataError, ErrorKind};
pub use types::{
    AuthorizedUser, Direction, FieldUpdate, Label, NodeKey, Property, PropertyMap, Relationship,
    RelationshipType, Session,
};
