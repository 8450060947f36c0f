//! Node repository: generic create/read/update/delete for labeled nodes.
//!
//! A node is addressed by a [`NodeKey`]. "Not found" is reported as `None`,
//! never as an error; store failures map onto the node error kinds.

use std::sync::Arc;

use serde_json::json;

use trellis_core::{DataError, ErrorKind, Label, NodeKey, Property, PropertyMap};

use crate::schema::{self, Changes, Properties, ALIAS};
use crate::store::{
    counter, property_map, GraphStore, Record, SessionScope, Statement, StoreError,
    WorkingSession,
};

type Result<T> = std::result::Result<T, DataError>;

const MATCH_PARAM: &str = "match_key";

/// Generic repository over labeled nodes.
///
/// Clone is cheap; every call opens and releases its own session.
#[derive(Clone)]
pub struct NodeRepository {
    store: Arc<dyn GraphStore>,
    database: String,
}

impl NodeRepository {
    pub fn new(store: Arc<dyn GraphStore>, database: impl Into<String>) -> Self {
        Self {
            store,
            database: database.into(),
        }
    }

    /// The same repository, operating on another database.
    pub fn in_database(&self, database: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    async fn scope(&self) -> Result<SessionScope> {
        SessionScope::open(self.store.as_ref(), &self.database).await
    }

    // ── Create ───────────────────────────────────────────────────

    /// Create one node and return its stored properties.
    pub async fn create_node(&self, properties: &Properties) -> Result<PropertyMap> {
        let label = properties.label();
        let rendered = properties.render();
        let statement = Statement::new(format!(
            "CREATE ({ALIAS}:{label} {pattern}) RETURN {ALIAS} {{.*}} AS node",
            pattern = rendered.pattern
        ))
        .params_from(rendered.params);

        let mut scope = self.scope().await?;
        let records = scope
            .run(statement)
            .await
            .map_err(|e| node_error(ErrorKind::CannotCreateNode, label, "create", e))?;

        if records.len() != 1 {
            return Err(DataError::new(
                ErrorKind::CannotCreateNode,
                format!("expected 1 {label} node created, store reported {}", records.len()),
            )
            .with_data(json!({"label": label, "created": records.len()})));
        }

        let node = property_map(&records[0], "node")
            .map_err(|e| node_error(ErrorKind::CannotCreateNode, label, "create", e))?;
        tracing::debug!(%label, database = %self.database, "Created node");
        Ok(node)
    }

    // ── Read ─────────────────────────────────────────────────────

    /// Get a single node, or `None` if nothing matches.
    pub async fn get_node(&self, key: &NodeKey) -> Result<Option<PropertyMap>> {
        let mut scope = self.scope().await?;
        Self::get_node_in(scope.session(), key).await
    }

    /// Same as [`get_node`](Self::get_node) on a session the caller already
    /// holds. Nothing is opened or released here.
    pub async fn get_node_in(
        session: &mut dyn WorkingSession,
        key: &NodeKey,
    ) -> Result<Option<PropertyMap>> {
        let statement = keyed(key, "RETURN n {.*} AS node")?;
        let records = session
            .run(statement)
            .await
            .map_err(|e| node_error(ErrorKind::CannotMatchNode, key.label, "match", e))?;
        first_node(&records, key.label, ErrorKind::CannotMatchNode)
    }

    /// All nodes of a label. Unbounded.
    pub async fn get_nodes(&self, label: Label) -> Result<Vec<PropertyMap>> {
        let statement =
            Statement::new(format!("MATCH ({ALIAS}:{label}) RETURN {ALIAS} {{.*}} AS node"));

        let mut scope = self.scope().await?;
        let records = scope
            .run(statement)
            .await
            .map_err(|e| node_error(ErrorKind::CannotMatchNode, label, "list", e))?;

        records
            .iter()
            .map(|r| {
                property_map(r, "node")
                    .map_err(|e| node_error(ErrorKind::CannotMatchNode, label, "list", e))
            })
            .collect()
    }

    // ── Delete ───────────────────────────────────────────────────

    /// Detach-delete a node and return its pre-image, or `None` if absent.
    pub async fn delete_node(&self, key: &NodeKey) -> Result<Option<PropertyMap>> {
        let mut scope = self.scope().await?;

        let Some(existing) = Self::get_node_in(scope.session(), key).await? else {
            return Ok(None);
        };

        let statement = keyed(key, "DETACH DELETE n RETURN count(n) AS deleted")?;
        let records = scope
            .run(statement)
            .await
            .map_err(|e| node_error(ErrorKind::CannotDeleteNode, key.label, "delete", e))?;

        let deleted = counter(&records, "deleted");
        if deleted != 1 {
            return Err(DataError::new(
                ErrorKind::CannotDeleteNode,
                format!("expected 1 {} node deleted, store reported {deleted}", key.label),
            )
            .with_data(json!({"key": key, "deleted": deleted})));
        }

        tracing::debug!(label = %key.label, database = %self.database, "Deleted node");
        Ok(Some(existing))
    }

    // ── Update ───────────────────────────────────────────────────

    /// Overwrite the properties `changes` sets and return the updated node.
    ///
    /// Removals recorded in `changes` are ignored here; see
    /// [`apply_changes`](Self::apply_changes).
    pub async fn update_node(
        &self,
        key: &NodeKey,
        changes: &Changes,
    ) -> Result<Option<PropertyMap>> {
        let mut scope = self.scope().await?;
        update_in(scope.session(), key, changes).await
    }

    /// Remove properties from a node entirely and return the updated node.
    pub async fn remove_properties(
        &self,
        key: &NodeKey,
        properties: &[Property],
    ) -> Result<Option<PropertyMap>> {
        let mut scope = self.scope().await?;
        remove_in(scope.session(), key, properties).await
    }

    /// Set and remove in one go, on a single session.
    pub async fn apply_changes(
        &self,
        key: &NodeKey,
        changes: &Changes,
    ) -> Result<Option<PropertyMap>> {
        if changes.label() != key.label {
            return Err(label_mismatch(key, changes.label()));
        }
        let mut scope = self.scope().await?;

        let mut current = None;
        if changes.has_assignments() {
            current = update_in(scope.session(), key, changes).await?;
            if current.is_none() {
                return Ok(None);
            }
        }
        if !changes.removed().is_empty() {
            current = remove_in(scope.session(), key, changes.removed()).await?;
        }
        if changes.is_empty() {
            current = Self::get_node_in(scope.session(), key).await?;
        }
        Ok(current)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

async fn update_in(
    session: &mut dyn WorkingSession,
    key: &NodeKey,
    changes: &Changes,
) -> Result<Option<PropertyMap>> {
    if changes.label() != key.label {
        return Err(label_mismatch(key, changes.label()));
    }
    let Some(set) = changes.set_clause() else {
        return NodeRepository::get_node_in(session, key).await;
    };

    let statement = keyed(key, &format!("{} RETURN n {{.*}} AS node", set.pattern))?
        .params_from(set.params);
    let records = session
        .run(statement)
        .await
        .map_err(|e| node_error(ErrorKind::CannotUpdateNode, key.label, "update", e))?;
    first_node(&records, key.label, ErrorKind::CannotUpdateNode)
}

async fn remove_in(
    session: &mut dyn WorkingSession,
    key: &NodeKey,
    properties: &[Property],
) -> Result<Option<PropertyMap>> {
    let Some(remove) = schema::remove_clause(key.label, properties)? else {
        return NodeRepository::get_node_in(session, key).await;
    };

    let statement = keyed(key, &format!("{remove} RETURN n {{.*}} AS node"))?;
    let records = session
        .run(statement)
        .await
        .map_err(|e| {
            node_error(ErrorKind::CannotUpdateNode, key.label, "remove properties of", e)
        })?;
    first_node(&records, key.label, ErrorKind::CannotUpdateNode)
}

/// `MATCH (n:Label {prop: $match_key}) <tail>`
fn keyed(key: &NodeKey, tail: &str) -> Result<Statement> {
    let node = schema::node_pattern(ALIAS, key, MATCH_PARAM)?;
    Ok(Statement::new(format!("MATCH {} {tail}", node.pattern)).params_from(node.params))
}

fn first_node(records: &[Record], label: Label, kind: ErrorKind) -> Result<Option<PropertyMap>> {
    if records.len() > 1 {
        tracing::warn!(%label, matched = records.len(), "Key matched more than one node");
    }
    records
        .first()
        .map(|r| property_map(r, "node").map_err(|e| node_error(kind, label, "read", e)))
        .transpose()
}

fn node_error(kind: ErrorKind, label: Label, action: &str, source: StoreError) -> DataError {
    DataError::new(kind, format!("could not {action} {label} node"))
        .with_data(json!({"label": label}))
        .with_source(source)
}

fn label_mismatch(key: &NodeKey, changes: Label) -> DataError {
    DataError::new(
        ErrorKind::InvalidProperty,
        format!("changes for {changes} applied to a {} key", key.label),
    )
    .with_data(json!({"key": key, "changes": changes}))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use trellis_core::FieldUpdate;

    use super::*;
    use crate::testing::MockStore;

    fn repo(store: &MockStore) -> NodeRepository {
        NodeRepository::new(Arc::new(store.clone()), "neo4j")
    }

    fn user_key() -> NodeKey {
        NodeKey::new(Label::User, "ada@example.com")
    }

    #[tokio::test]
    async fn create_returns_stored_properties() {
        let store = MockStore::new();
        store.respond_node(json!({"id": "u-1", "email": "ada@example.com"}));

        let props = Properties::new(Label::User)
            .generated_id(Property::Id)
            .unwrap()
            .with(Property::Email, "ada@example.com")
            .unwrap();
        let node = repo(&store).create_node(&props).await.unwrap();

        assert_eq!(node["id"], "u-1");
        let executed = store.executed();
        assert_eq!(executed[0].database, "neo4j");
        assert_eq!(
            executed[0].statement.text(),
            "CREATE (n:User {id: randomUUID(), email: $email}) RETURN n {.*} AS node"
        );
        assert_eq!(executed[0].statement.params()["email"], "ada@example.com");
        store.assert_released();
    }

    #[tokio::test]
    async fn create_without_created_row_fails() {
        let store = MockStore::new();
        store.respond(vec![]);

        let props = Properties::new(Label::User).with(Property::Email, "x@example.com").unwrap();
        let err = repo(&store).create_node(&props).await.unwrap_err();

        assert!(err.is(ErrorKind::CannotCreateNode));
        store.assert_released();
    }

    #[tokio::test]
    async fn create_constraint_violation_wraps_cause() {
        let store = MockStore::new();
        store.fail_next(StoreError::Rejected(
            "Neo.ClientError.Schema.ConstraintValidationFailed".into(),
        ));

        let props = Properties::new(Label::User).with(Property::Email, "x@example.com").unwrap();
        let err = repo(&store).create_node(&props).await.unwrap_err();

        assert!(err.is(ErrorKind::CannotCreateNode));
        let cause = std::error::Error::source(&err).unwrap().to_string();
        assert!(cause.contains("ConstraintValidationFailed"));
        store.assert_released();
    }

    #[tokio::test]
    async fn get_missing_node_is_none() {
        let store = MockStore::new();
        store.respond(vec![]);

        let found = repo(&store).get_node(&user_key()).await.unwrap();

        assert!(found.is_none());
        assert_eq!(
            store.executed()[0].statement.text(),
            "MATCH (n:User {email: $match_key}) RETURN n {.*} AS node"
        );
        store.assert_released();
    }

    #[tokio::test]
    async fn get_store_failure_is_match_error() {
        let store = MockStore::new();
        store.fail_next(StoreError::Connection("reset by peer".into()));

        let err = repo(&store).get_node(&user_key()).await.unwrap_err();

        assert!(err.is(ErrorKind::CannotMatchNode));
        store.assert_released();
    }

    #[tokio::test]
    async fn get_nodes_collects_every_row() {
        let store = MockStore::new();
        store.respond(vec![
            MockStore::node_record(json!({"name": "acme"})),
            MockStore::node_record(json!({"name": "globex"})),
        ]);

        let nodes = repo(&store).get_nodes(Label::Organization).await.unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1]["name"], "globex");
    }

    #[tokio::test]
    async fn delete_reads_then_deletes_on_one_session() {
        let store = MockStore::new();
        store.respond_node(json!({"email": "ada@example.com"}));
        store.respond_count("deleted", 1);

        let deleted = repo(&store).delete_node(&user_key()).await.unwrap();

        assert_eq!(deleted.unwrap()["email"], "ada@example.com");
        assert_eq!(store.acquisitions(), 1);
        let executed = store.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[1].statement.text().contains("DETACH DELETE n"));
        store.assert_released();
    }

    #[tokio::test]
    async fn delete_missing_node_has_no_side_effects() {
        let store = MockStore::new();
        store.respond(vec![]);

        let deleted = repo(&store).delete_node(&user_key()).await.unwrap();

        assert!(deleted.is_none());
        assert_eq!(store.executed().len(), 1);
        store.assert_released();
    }

    #[tokio::test]
    async fn delete_count_mismatch_fails() {
        let store = MockStore::new();
        store.respond_node(json!({"email": "ada@example.com"}));
        store.respond_count("deleted", 0);

        let err = repo(&store).delete_node(&user_key()).await.unwrap_err();

        assert!(err.is(ErrorKind::CannotDeleteNode));
        store.assert_released();
    }

    #[tokio::test]
    async fn update_sets_only_supplied_fields() {
        let store = MockStore::new();
        store.respond_node(json!({"email": "ada@example.com", "name": "Ada"}));

        let changes = Changes::new(Label::User)
            .field(Property::Name, FieldUpdate::Set("Ada"))
            .unwrap()
            .field::<&str>(Property::Auth, FieldUpdate::Untouched)
            .unwrap();
        let updated = repo(&store).update_node(&user_key(), &changes).await.unwrap();

        assert_eq!(updated.unwrap()["name"], "Ada");
        let statement = &store.executed()[0].statement;
        assert_eq!(
            statement.text(),
            "MATCH (n:User {email: $match_key}) SET n.name = $set_name RETURN n {.*} AS node"
        );
        assert!(!statement.params().contains_key("set_auth"));
        store.assert_released();
    }

    #[tokio::test]
    async fn update_missing_node_is_none() {
        let store = MockStore::new();
        store.respond(vec![]);

        let changes = Changes::new(Label::User).set(Property::Name, "Ada").unwrap();
        let updated = repo(&store).update_node(&user_key(), &changes).await.unwrap();

        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn update_store_failure_is_update_error() {
        let store = MockStore::new();
        store.fail_next(StoreError::Rejected("type mismatch".into()));

        let changes = Changes::new(Label::User).set(Property::Name, "Ada").unwrap();
        let err = repo(&store).update_node(&user_key(), &changes).await.unwrap_err();

        assert!(err.is(ErrorKind::CannotUpdateNode));
        store.assert_released();
    }

    #[tokio::test]
    async fn update_rejects_foreign_label() {
        let store = MockStore::new();
        let changes = Changes::new(Label::Project).set(Property::Name, "atlas").unwrap();

        let err = repo(&store).update_node(&user_key(), &changes).await.unwrap_err();

        assert!(err.is(ErrorKind::InvalidProperty));
        assert!(store.executed().is_empty());
        store.assert_released();
    }

    #[tokio::test]
    async fn remove_properties_emits_remove_clause() {
        let store = MockStore::new();
        store.respond_node(json!({"email": "ada@example.com"}));

        let updated = repo(&store)
            .remove_properties(&user_key(), &[Property::Name])
            .await
            .unwrap();

        assert!(updated.unwrap().get("name").is_none());
        assert_eq!(
            store.executed()[0].statement.text(),
            "MATCH (n:User {email: $match_key}) REMOVE n.name RETURN n {.*} AS node"
        );
    }

    #[tokio::test]
    async fn apply_changes_sets_and_removes_on_one_session() {
        let store = MockStore::new();
        store.respond_node(json!({"email": "ada@example.com", "name": "Ada", "auth": "member"}));
        store.respond_node(json!({"email": "ada@example.com", "name": "Ada"}));

        let changes = Changes::new(Label::User)
            .field(Property::Name, FieldUpdate::Set("Ada"))
            .unwrap()
            .field::<&str>(Property::Auth, FieldUpdate::Remove)
            .unwrap();
        let updated = repo(&store).apply_changes(&user_key(), &changes).await.unwrap().unwrap();

        assert_eq!(updated["name"], "Ada");
        assert!(updated.get("auth").is_none());
        assert_eq!(store.acquisitions(), 1);
        let executed = store.executed();
        assert!(executed[0].statement.text().contains("SET n.name"));
        assert!(executed[1].statement.text().contains("REMOVE n.auth"));
        store.assert_released();
    }

    #[tokio::test]
    async fn apply_changes_stops_when_node_missing() {
        let store = MockStore::new();
        store.respond(vec![]);

        let changes = Changes::new(Label::User)
            .set(Property::Name, "Ada")
            .unwrap()
            .remove(Property::Auth)
            .unwrap();
        let updated = repo(&store).apply_changes(&user_key(), &changes).await.unwrap();

        assert!(updated.is_none());
        assert_eq!(store.executed().len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_acquire_is_reported() {
        let store = MockStore::new();
        store.fail_acquire(StoreError::Unauthorized("bad credentials".into()));

        let err = repo(&store).get_node(&user_key()).await.unwrap_err();

        assert!(err.is(ErrorKind::DbConnectionUnauthorized));
        store.assert_released();
    }

    #[tokio::test]
    async fn in_database_targets_other_database() {
        let store = MockStore::new();
        store.respond(vec![]);

        repo(&store)
            .in_database("tenant-b")
            .get_node(&user_key())
            .await
            .unwrap();

        assert_eq!(store.executed()[0].database, "tenant-b");
    }
}
