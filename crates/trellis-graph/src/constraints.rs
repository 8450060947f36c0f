//! Schema bootstrap: database creation and uniqueness constraints.

use std::sync::Arc;

use serde_json::json;

use trellis_core::{DataError, ErrorKind, Label, Property};

use crate::store::{counter, GraphStore, SessionScope, Statement};

type Result<T> = std::result::Result<T, DataError>;

/// Database that administrative statements run against.
const SYSTEM_DATABASE: &str = "system";

/// What a constraint guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `REQUIRE n.p IS UNIQUE`
    Unique,
    /// `REQUIRE n.p IS NODE KEY`: unique and mandatory.
    NodeKey,
}

impl ConstraintKind {
    fn requirement(self) -> &'static str {
        match self {
            Self::Unique => "IS UNIQUE",
            Self::NodeKey => "IS NODE KEY",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Unique => "unique",
            Self::NodeKey => "key",
        }
    }
}

/// Result of declaring a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOutcome {
    Created,
    AlreadyExists,
}

/// Deterministic constraint name, e.g. `user_email_unique`.
pub fn constraint_name(label: Label, property: Property, kind: ConstraintKind) -> String {
    format!(
        "{}_{}_{}",
        label.as_str().to_lowercase(),
        property.as_str().to_lowercase(),
        kind.suffix()
    )
}

/// Declares the store-level invariants the repositories rely on.
#[derive(Clone)]
pub struct ConstraintManager {
    store: Arc<dyn GraphStore>,
    database: String,
}

impl ConstraintManager {
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

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Create the database if it does not exist yet, waiting until it is
    /// online.
    pub async fn create_database(&self, name: &str) -> Result<()> {
        let statement =
            Statement::new("CREATE DATABASE $name IF NOT EXISTS WAIT").param("name", name);

        let mut scope = SessionScope::open(self.store.as_ref(), SYSTEM_DATABASE).await?;
        scope.run(statement).await.map_err(|e| {
            DataError::new(
                ErrorKind::CouldNotCreateDb,
                format!("could not create database {name}"),
            )
            .with_data(json!({"database": name}))
            .with_source(e)
        })?;

        tracing::info!(database = %name, "Database ready");
        Ok(())
    }

    /// Declare a constraint, reporting whether it was new.
    ///
    /// A constraint counts as existing when one with the same name, or any
    /// constraint on the same label and property, is already declared. If
    /// the create is rejected because a concurrent caller declared it
    /// first, the outcome is `AlreadyExists`.
    pub async fn declare_constraint(
        &self,
        label: Label,
        property: Property,
        kind: ConstraintKind,
    ) -> Result<ConstraintOutcome> {
        let name = constraint_name(label, property, kind);
        if !label.allows(property) {
            return Err(constraint_error(
                &name,
                format!("{label} nodes have no `{property}` property"),
            ));
        }

        let mut scope = SessionScope::open(self.store.as_ref(), &self.database).await?;

        let existing = scope
            .run(existing_constraint(&name, label, property))
            .await
            .map_err(|e| constraint_error(&name, "could not list constraints").with_source(e))?;

        if counter(&existing, "existing") > 0 {
            tracing::debug!(
                constraint = %name,
                database = %self.database,
                "Constraint already exists"
            );
            return Ok(ConstraintOutcome::AlreadyExists);
        }

        let create = Statement::new(format!(
            "CREATE CONSTRAINT {name} FOR (n:{label}) REQUIRE n.{property} {}",
            kind.requirement()
        ));
        if let Err(e) = scope.run(create).await {
            let recheck = scope.run(existing_constraint(&name, label, property)).await;
            if matches!(recheck, Ok(rows) if counter(&rows, "existing") > 0) {
                tracing::debug!(constraint = %name, "Constraint declared concurrently");
                return Ok(ConstraintOutcome::AlreadyExists);
            }
            return Err(constraint_error(&name, "could not create constraint").with_source(e));
        }

        tracing::info!(constraint = %name, database = %self.database, "Constraint created");
        Ok(ConstraintOutcome::Created)
    }

    /// Strict form of [`declare_constraint`](Self::declare_constraint): a
    /// constraint that already exists is an error.
    pub async fn initialize_constraint(
        &self,
        label: Label,
        property: Property,
        is_composite_key: bool,
    ) -> Result<()> {
        let kind = if is_composite_key {
            ConstraintKind::NodeKey
        } else {
            ConstraintKind::Unique
        };
        match self.declare_constraint(label, property, kind).await? {
            ConstraintOutcome::Created => Ok(()),
            ConstraintOutcome::AlreadyExists => {
                let name = constraint_name(label, property, kind);
                Err(constraint_error(&name, format!("constraint {name} already exists"))
                    .with_data(json!({"constraint": name, "reason": "already exists"})))
            }
        }
    }

    /// Declare a unique constraint on every label's identifying property.
    /// Constraints that already exist are reported, not treated as errors.
    pub async fn initialize_constraints(&self) -> Result<Vec<(String, ConstraintOutcome)>> {
        let mut outcomes = Vec::with_capacity(Label::ALL.len());
        for label in Label::ALL {
            let property = label.identifying_property();
            let outcome = self
                .declare_constraint(label, property, ConstraintKind::Unique)
                .await?;
            outcomes.push((constraint_name(label, property, ConstraintKind::Unique), outcome));
        }
        Ok(outcomes)
    }
}

/// Count constraints named `name` or covering `label.property`.
fn existing_constraint(name: &str, label: Label, property: Property) -> Statement {
    Statement::new(
        "SHOW CONSTRAINTS YIELD name, labelsOrTypes, properties
         WHERE name = $name OR (labelsOrTypes = [$label] AND properties = [$property])
         RETURN count(*) AS existing",
    )
    .param("name", name)
    .param("label", label.as_str())
    .param("property", property.as_str())
}

fn constraint_error(name: &str, message: impl Into<String>) -> DataError {
    DataError::new(ErrorKind::CouldNotCreateConstraint, message)
        .with_data(json!({"constraint": name}))
}
