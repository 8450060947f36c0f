//! Relationship repository: create, delete and traverse typed edges.

use std::sync::Arc;

use serde_json::json;

use trellis_core::{
    DataError, Direction, ErrorKind, Label, NodeKey, PropertyMap, Relationship, RelationshipType,
};

use crate::schema;
use crate::store::{counter, property_map, GraphStore, SessionScope, Statement, StoreError};

type Result<T> = std::result::Result<T, DataError>;

/// Repository over directed, typed edges between two keyed nodes.
#[derive(Clone)]
pub struct RelationshipRepository {
    store: Arc<dyn GraphStore>,
    database: String,
}

impl RelationshipRepository {
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

    async fn scope(&self) -> Result<SessionScope> {
        SessionScope::open(self.store.as_ref(), &self.database).await
    }

    /// Create `node1 -[type]-> node2`.
    ///
    /// Fails with `COULD_NOT_CREATE_RELATIONSHIP` unless exactly one edge was
    /// created: a missing endpoint and an already existing edge both count
    /// as failure.
    pub async fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        let kind = ErrorKind::CouldNotCreateRelationship;
        let rel_type = relationship.relationship_type;
        let (a, b) = endpoints(relationship).map_err(|e| retag(e, kind))?;

        let statement = Statement::new(format!(
            "MATCH {a}, {b}
             WHERE NOT (a)-[:{rel_type}]->(b)
             CREATE (a)-[r:{rel_type}]->(b)
             RETURN count(r) AS created",
            a = a.pattern,
            b = b.pattern
        ))
        .params_from(a.params)
        .params_from(b.params);

        let mut scope = self.scope().await?;
        let records = scope
            .run(statement)
            .await
            .map_err(|e| relationship_error(kind, relationship, "create", Some(e)))?;

        let created = counter(&records, "created");
        if created != 1 {
            return Err(relationship_error(kind, relationship, "create", None)
                .with_data(json!({"relationship": relationship, "created": created})));
        }

        tracing::debug!(
            %rel_type,
            from = %relationship.node1.label,
            to = %relationship.node2.label,
            "Created relationship"
        );
        Ok(())
    }

    /// Delete the exact edge `node1 -[type]-> node2`.
    pub async fn delete_relationship(&self, relationship: &Relationship) -> Result<()> {
        let kind = ErrorKind::CouldNotDeleteRelationship;
        let rel_type = relationship.relationship_type;
        let (a, b) = endpoints(relationship).map_err(|e| retag(e, kind))?;

        let statement = Statement::new(format!(
            "MATCH {a}-[r:{rel_type}]->{b}
             DELETE r
             RETURN count(r) AS deleted",
            a = a.pattern,
            b = b.pattern
        ))
        .params_from(a.params)
        .params_from(b.params);

        let mut scope = self.scope().await?;
        let records = scope
            .run(statement)
            .await
            .map_err(|e| relationship_error(kind, relationship, "delete", Some(e)))?;

        let deleted = counter(&records, "deleted");
        if deleted != 1 {
            return Err(relationship_error(kind, relationship, "delete", None)
                .with_data(json!({"relationship": relationship, "deleted": deleted})));
        }

        tracing::debug!(%rel_type, "Deleted relationship");
        Ok(())
    }

    /// All `other_label` nodes joined to `anchor` by `rel_type`.
    ///
    /// `Going` matches `anchor -[type]-> other`, `Coming` matches
    /// `other -[type]-> anchor`.
    pub async fn get_relationships_to_node(
        &self,
        anchor: &NodeKey,
        other_label: Label,
        rel_type: RelationshipType,
        direction: Direction,
    ) -> Result<Vec<PropertyMap>> {
        let a = schema::node_pattern("a", anchor, "anchor_key")?;
        let edge = match direction {
            Direction::Going => format!("-[:{rel_type}]->"),
            Direction::Coming => format!("<-[:{rel_type}]-"),
        };
        let statement = Statement::new(format!(
            "MATCH {a}{edge}(n:{other_label}) RETURN n {{.*}} AS node",
            a = a.pattern
        ))
        .params_from(a.params);

        let mut scope = self.scope().await?;
        let records = scope
            .run(statement)
            .await
            .map_err(|e| traversal_error(anchor, rel_type, e))?;

        records
            .iter()
            .map(|r| property_map(r, "node").map_err(|e| traversal_error(anchor, rel_type, e)))
            .collect()
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn endpoints(
    relationship: &Relationship,
) -> Result<(schema::Rendered, schema::Rendered)> {
    let a = schema::node_pattern("a", &relationship.node1, "a_key")?;
    let b = schema::node_pattern("b", &relationship.node2, "b_key")?;
    Ok((a, b))
}

/// Report an invalid endpoint key under the relationship's own error kind.
fn retag(e: DataError, kind: ErrorKind) -> DataError {
    let message = e.message().to_string();
    let data = e.data().cloned();
    let err = DataError::new(kind, message).with_source(e);
    match data {
        Some(d) => err.with_data(d),
        None => err,
    }
}

fn relationship_error(
    kind: ErrorKind,
    relationship: &Relationship,
    action: &str,
    source: Option<StoreError>,
) -> DataError {
    let err = DataError::new(
        kind,
        format!(
            "could not {action} {} relationship from {} to {}",
            relationship.relationship_type, relationship.node1.label, relationship.node2.label
        ),
    )
    .with_data(json!({"relationship": relationship}));
    match source {
        Some(e) => err.with_source(e),
        None => err,
    }
}

fn traversal_error(anchor: &NodeKey, rel_type: RelationshipType, e: StoreError) -> DataError {
    DataError::new(
        ErrorKind::CannotMatchNode,
        format!("could not traverse {rel_type} from {} node", anchor.label),
    )
    .with_data(json!({"anchor": anchor}))
    .with_source(e)
}

#[cfg(test)]
mod tests {
    use trellis_core::Property;

    use super::*;
    use crate::testing::MockStore;

    fn repo(store: &MockStore) -> RelationshipRepository {
        RelationshipRepository::new(Arc::new(store.clone()), "neo4j")
    }

    fn membership() -> Relationship {
        Relationship::new(
            NodeKey::new(Label::User, "ada@example.com"),
            RelationshipType::MemberOf,
            NodeKey::new(Label::Organization, "acme"),
        )
    }

    #[tokio::test]
    async fn create_matches_both_endpoints_in_one_statement() {
        let store = MockStore::new();
        store.respond_count("created", 1);

        repo(&store).create_relationship(&membership()).await.unwrap();

        let executed = store.executed();
        assert_eq!(executed.len(), 1);
        let text = executed[0].statement.text();
        assert!(text.contains("MATCH (a:User {email: $a_key}), (b:Organization {name: $b_key})"));
        assert!(text.contains("CREATE (a)-[r:MEMBER_OF]->(b)"));
        assert_eq!(executed[0].statement.params()["b_key"], "acme");
        store.assert_released();
    }

    #[tokio::test]
    async fn create_with_nothing_created_fails() {
        let store = MockStore::new();
        store.respond_count("created", 0);

        let err = repo(&store).create_relationship(&membership()).await.unwrap_err();

        assert!(err.is(ErrorKind::CouldNotCreateRelationship));
        assert_eq!(err.data().unwrap()["created"], 0);
        store.assert_released();
    }

    #[tokio::test]
    async fn create_with_invalid_endpoint_key_fails_before_store() {
        let store = MockStore::new();
        let rel = Relationship::new(
            NodeKey::by(Label::Session, Property::Email, "x"),
            RelationshipType::HasSession,
            NodeKey::new(Label::User, "ada@example.com"),
        );

        let err = repo(&store).create_relationship(&rel).await.unwrap_err();

        assert!(err.is(ErrorKind::CouldNotCreateRelationship));
        assert_eq!(store.acquisitions(), 0);
    }

    #[tokio::test]
    async fn delete_requires_exactly_one_edge() {
        let store = MockStore::new();
        store.respond_count("deleted", 1);
        store.respond_count("deleted", 0);

        repo(&store).delete_relationship(&membership()).await.unwrap();
        let err = repo(&store).delete_relationship(&membership()).await.unwrap_err();

        assert!(err.is(ErrorKind::CouldNotDeleteRelationship));
        assert!(store.executed()[0]
            .statement
            .text()
            .contains("MATCH (a:User {email: $a_key})-[r:MEMBER_OF]->(b:Organization {name: $b_key})"));
        store.assert_released();
    }

    #[tokio::test]
    async fn delete_store_failure_is_reported() {
        let store = MockStore::new();
        store.fail_next(StoreError::Connection("broken pipe".into()));

        let err = repo(&store).delete_relationship(&membership()).await.unwrap_err();

        assert!(err.is(ErrorKind::CouldNotDeleteRelationship));
        store.assert_released();
    }

    #[tokio::test]
    async fn traversal_direction_controls_pattern() {
        let store = MockStore::new();
        store.respond(vec![MockStore::node_record(json!({"name": "acme"}))]);
        store.respond(vec![MockStore::node_record(json!({"email": "ada@example.com"}))]);

        let orgs = repo(&store)
            .get_relationships_to_node(
                &NodeKey::new(Label::User, "ada@example.com"),
                Label::Organization,
                RelationshipType::MemberOf,
                Direction::Going,
            )
            .await
            .unwrap();
        let users = repo(&store)
            .get_relationships_to_node(
                &NodeKey::new(Label::Organization, "acme"),
                Label::User,
                RelationshipType::MemberOf,
                Direction::Coming,
            )
            .await
            .unwrap();

        assert_eq!(orgs[0]["name"], "acme");
        assert_eq!(users[0]["email"], "ada@example.com");
        let executed = store.executed();
        assert_eq!(
            executed[0].statement.text(),
            "MATCH (a:User {email: $anchor_key})-[:MEMBER_OF]->(n:Organization) RETURN n {.*} AS node"
        );
        assert_eq!(
            executed[1].statement.text(),
            "MATCH (a:Organization {name: $anchor_key})<-[:MEMBER_OF]-(n:User) RETURN n {.*} AS node"
        );
        store.assert_released();
    }
}
