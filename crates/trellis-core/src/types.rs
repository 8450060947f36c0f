//! Core domain vocabulary for the Trellis graph.
//!
//! Labels, relationship types and property names form closed sets: they are
//! the only identifiers ever interpolated into Cypher text. Everything a
//! caller supplies travels as a bound parameter.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Property map of a node as returned by the store.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

// ── Labels ────────────────────────────────────────────────────────

/// Every node label the application knows about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Label {
    User,
    Session,
    Organization,
    Project,
}

impl Label {
    pub const ALL: [Label; 4] = [
        Label::User,
        Label::Session,
        Label::Organization,
        Label::Project,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Session => "Session",
            Self::Organization => "Organization",
            Self::Project => "Project",
        }
    }

    /// The property that addresses a single node of this label.
    pub fn identifying_property(self) -> Property {
        match self {
            Self::User => Property::Email,
            Self::Session => Property::Id,
            Self::Organization => Property::Name,
            Self::Project => Property::Id,
        }
    }

    /// Properties a node of this label may carry.
    pub fn schema(self) -> &'static [Property] {
        match self {
            Self::User => &[
                Property::Id,
                Property::Email,
                Property::Name,
                Property::Auth,
                Property::PasswordHash,
                Property::CreatedAt,
            ],
            Self::Session => &[Property::Id, Property::ExpiresAt],
            Self::Organization => &[Property::Name, Property::Description, Property::CreatedAt],
            Self::Project => &[
                Property::Id,
                Property::Name,
                Property::Description,
                Property::CreatedAt,
            ],
        }
    }

    pub fn allows(self, property: Property) -> bool {
        self.schema().contains(&property)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Properties ────────────────────────────────────────────────────

/// Every property name that may appear in a statement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    Id,
    Email,
    Name,
    Auth,
    PasswordHash,
    Description,
    ExpiresAt,
    CreatedAt,
}

impl Property {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Email => "email",
            Self::Name => "name",
            Self::Auth => "auth",
            Self::PasswordHash => "passwordHash",
            Self::Description => "description",
            Self::ExpiresAt => "expiresAt",
            Self::CreatedAt => "createdAt",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Relationships ─────────────────────────────────────────────────

/// The type of a directed relationship between two nodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// User owns a Session.
    HasSession,
    /// User belongs to an Organization.
    MemberOf,
    /// Organization owns a Project.
    Owns,
    /// User works on a Project.
    ContributesTo,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasSession => "HAS_SESSION",
            Self::MemberOf => "MEMBER_OF",
            Self::Owns => "OWNS",
            Self::ContributesTo => "CONTRIBUTES_TO",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a relationship the anchor node sits on during traversal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// `anchor -[type]-> other`
    #[default]
    Going,
    /// `other -[type]-> anchor`
    Coming,
}

/// Addresses exactly one node: label plus the value of its identifying property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeKey {
    pub label: Label,
    pub property: Property,
    pub value: serde_json::Value,
}

impl NodeKey {
    /// Key on the label's identifying property.
    pub fn new(label: Label, value: impl Into<serde_json::Value>) -> Self {
        Self {
            label,
            property: label.identifying_property(),
            value: value.into(),
        }
    }

    /// Key on some other property of the label (e.g. a Project by `name`).
    pub fn by(label: Label, property: Property, value: impl Into<serde_json::Value>) -> Self {
        Self {
            label,
            property,
            value: value.into(),
        }
    }
}

/// A typed, directed edge between two nodes. Carries no identity of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub node1: NodeKey,
    pub node2: NodeKey,
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub direction: Direction,
}

impl Relationship {
    /// An edge `node1 -[type]-> node2`.
    pub fn new(node1: NodeKey, relationship_type: RelationshipType, node2: NodeKey) -> Self {
        Self {
            node1,
            node2,
            relationship_type,
            direction: Direction::Going,
        }
    }
}

// ── Updates ───────────────────────────────────────────────────────

/// How a single field of an update request should be applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldUpdate<T> {
    /// Field absent from the request: leave the stored value alone.
    #[default]
    Untouched,
    /// Field present: overwrite the stored value.
    Set(T),
    /// Field explicitly cleared: remove the property from the node.
    Remove,
}

impl<T> FieldUpdate<T> {
    pub fn is_untouched(&self) -> bool {
        matches!(self, Self::Untouched)
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Untouched,
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────────

/// A login session. `id` is the hash of the bearer token, never the token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Validation never checks this; callers that care must.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The user behind a validated session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub email: String,
    pub auth: String,
    pub id: Option<String>,
}
