//! Trellis Graph — repositories over the Neo4j property graph.
//!
//! Every read and write of application data flows through this crate:
//! the node and relationship repositories, the constraint bootstrap, and
//! the store contract they run on. Each call opens its own working session
//! and releases it before returning.

pub mod client;
pub mod constraints;
pub mod nodes;
pub mod relationships;
pub mod schema;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::GraphClient;
pub use constraints::{ConstraintKind, ConstraintManager, ConstraintOutcome};
pub use nodes::NodeRepository;
pub use relationships::RelationshipRepository;
pub use schema::{Changes, Properties};
pub use store::{GraphStore, SessionScope, Statement, StoreError};
pub use trellis_core::config::GraphConfig;
