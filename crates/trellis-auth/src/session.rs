//! Session manager: create, validate and invalidate login sessions.
//!
//! A session is a `Session` node owned by a `User` through a
//! `HAS_SESSION` edge. The node's `id` is the hash of the bearer token.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use trellis_core::{
    AuthorizedUser, DataError, ErrorKind, Label, Property, RelationshipType, Session,
};
use trellis_graph::store::{counter, Record};
use trellis_graph::{GraphStore, Properties, SessionScope, Statement};

use crate::token::hash_session_token;

type Result<T> = std::result::Result<T, DataError>;

/// How long a new session stays valid.
pub const SESSION_TTL_DAYS: i64 = 30;

/// Outcome of validating a token. Both halves are `None` when the token
/// does not resolve to a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionValidation {
    pub session: Option<Session>,
    pub user: Option<AuthorizedUser>,
}

impl SessionValidation {
    pub fn is_valid(&self) -> bool {
        self.session.is_some()
    }
}

/// Issues, resolves and revokes sessions.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn GraphStore>,
    database: String,
}

impl SessionManager {
    pub fn new(store: Arc<dyn GraphStore>, database: impl Into<String>) -> Self {
        Self {
            store,
            database: database.into(),
        }
    }

    pub fn in_database(&self, database: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            database: database.into(),
        }
    }

    async fn scope(&self) -> Result<SessionScope> {
        SessionScope::open(self.store.as_ref(), &self.database).await
    }

    /// Store a session for `token` owned by the user with `user_email`.
    ///
    /// The raw token is hashed before it reaches the store. An empty token
    /// is refused: validation treats it as absent.
    pub async fn create_session(&self, token: &str, user_email: &str) -> Result<Session> {
        if token.is_empty() {
            return Err(DataError::new(
                ErrorKind::CannotCreateSession,
                "session token must not be empty",
            )
            .with_data(json!({"email": user_email})));
        }

        let id = hash_session_token(token);
        let expires_at = Utc::now() + TimeDelta::days(SESSION_TTL_DAYS);

        let node = Properties::new(Label::Session)
            .with(Property::Id, id.as_str())?
            .with(Property::ExpiresAt, expires_at.to_rfc3339())?
            .render();
        let statement = Statement::new(format!(
            "MATCH (u:{user} {{email: $email}})
             CREATE (u)-[:{owns}]->(s:{session} {pattern})
             RETURN s.id AS id, coalesce(u.id, u.email) AS userID, s.expiresAt AS expiresAt",
            user = Label::User,
            owns = RelationshipType::HasSession,
            session = Label::Session,
            pattern = node.pattern
        ))
        .param("email", user_email)
        .params_from(node.params);

        let mut scope = self.scope().await?;
        let records = scope.run(statement).await.map_err(|e| {
            DataError::new(ErrorKind::CannotCreateSession, "could not store session")
                .with_data(json!({"email": user_email}))
                .with_source(e)
        })?;

        let Some(record) = records.first() else {
            return Err(DataError::new(
                ErrorKind::CannotCreateSession,
                format!("no user with email {user_email}"),
            )
            .with_data(json!({"email": user_email})));
        };

        let session = parse_session(record).map_err(|e| retag(e, ErrorKind::CannotCreateSession))?;
        tracing::info!(user_id = %session.user_id, expires_at = %session.expires_at, "Session created");
        Ok(session)
    }

    /// Resolve a bearer token to its session and user.
    ///
    /// Expiry is not checked here; use [`Session::is_expired`].
    pub async fn validate_session_token(&self, token: Option<&str>) -> Result<SessionValidation> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(SessionValidation::default());
        };

        let statement = Statement::new(format!(
            "MATCH (u:{user})-[:{owns}]->(s:{session} {{id: $id}})
             RETURN s.id AS id, s.expiresAt AS expiresAt,
                    coalesce(u.id, u.email) AS userID,
                    u.email AS email, u.auth AS auth, u.id AS userId",
            user = Label::User,
            owns = RelationshipType::HasSession,
            session = Label::Session,
        ))
        .param("id", hash_session_token(token));

        let mut scope = self.scope().await?;
        let records = scope.run(statement).await.map_err(|e| {
            DataError::new(ErrorKind::CannotMatchNode, "could not look up session").with_source(e)
        })?;

        let Some(record) = records.first() else {
            return Ok(SessionValidation::default());
        };

        let session = parse_session(record)?;
        let user = AuthorizedUser {
            email: text(record, "email").unwrap_or_default(),
            auth: text(record, "auth").unwrap_or_default(),
            id: text(record, "userId"),
        };
        Ok(SessionValidation {
            session: Some(session),
            user: Some(user),
        })
    }

    /// Delete one session. Deleting an unknown session is not an error.
    pub async fn invalidate_session(&self, session_id: &str) -> Result<()> {
        let statement = Statement::new(format!(
            "MATCH (s:{session} {{id: $id}}) DETACH DELETE s RETURN count(s) AS deleted",
            session = Label::Session
        ))
        .param("id", session_id);

        let mut scope = self.scope().await?;
        let records = scope.run(statement).await.map_err(|e| {
            DataError::new(ErrorKind::CannotDeleteNode, "could not invalidate session")
                .with_source(e)
        })?;

        tracing::info!(deleted = counter(&records, "deleted"), "Session invalidated");
        Ok(())
    }

    /// Delete every session owned by the user with `user_email`.
    /// Returns how many were removed.
    pub async fn invalidate_all_sessions(&self, user_email: &str) -> Result<u64> {
        let statement = Statement::new(format!(
            "MATCH (:{user} {{email: $email}})-[:{owns}]->(s:{session})
             DETACH DELETE s
             RETURN count(s) AS deleted",
            user = Label::User,
            owns = RelationshipType::HasSession,
            session = Label::Session,
        ))
        .param("email", user_email);

        let mut scope = self.scope().await?;
        let records = scope.run(statement).await.map_err(|e| {
            DataError::new(ErrorKind::CannotDeleteNode, "could not invalidate sessions")
                .with_data(json!({"email": user_email}))
                .with_source(e)
        })?;

        let deleted = counter(&records, "deleted").max(0) as u64;
        tracing::info!(deleted, "All sessions of user invalidated");
        Ok(deleted)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn text(record: &Record, column: &str) -> Option<String> {
    record.get(column).and_then(Value::as_str).map(str::to_string)
}

fn parse_session(record: &Record) -> Result<Session> {
    let malformed = |what: &str| {
        DataError::new(ErrorKind::CannotMatchNode, format!("malformed session record: {what}"))
    };

    let id = text(record, "id").ok_or_else(|| malformed("missing id"))?;
    let user_id = text(record, "userID").ok_or_else(|| malformed("missing userID"))?;
    let raw_expiry = text(record, "expiresAt").ok_or_else(|| malformed("missing expiresAt"))?;
    let expires_at = DateTime::parse_from_rfc3339(&raw_expiry)
        .map_err(|e| malformed("unparseable expiresAt").with_source(e))?
        .with_timezone(&Utc);

    Ok(Session {
        id,
        user_id,
        expires_at,
    })
}

fn retag(e: DataError, kind: ErrorKind) -> DataError {
    DataError::new(kind, e.message().to_string()).with_source(e)
}
