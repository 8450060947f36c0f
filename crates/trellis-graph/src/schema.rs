//! Cypher clause builder.
//!
//! Builds property patterns, `SET` and `REMOVE` clauses from
//! `(Property, value)` pairs. Property names come from the closed
//! [`Property`] set and are checked against the label's schema before they
//! reach statement text; values are always bound as parameters.

use serde_json::{json, Value};

use trellis_core::{DataError, ErrorKind, FieldUpdate, Label, NodeKey, Property};

type Result<T> = std::result::Result<T, DataError>;

/// Alias every repository statement uses for the node it addresses.
pub(crate) const ALIAS: &str = "n";

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Param(Value),
    GeneratedId,
}

/// A property pattern plus the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub pattern: String,
    pub params: Vec<(String, Value)>,
}

/// Properties of a node to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    label: Label,
    entries: Vec<(Property, Source)>,
}

impl Properties {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            entries: Vec::new(),
        }
    }

    pub fn label(&self) -> Label {
        self.label
    }

    /// Set `property` to a bound value. Later calls replace earlier ones.
    pub fn with(self, property: Property, value: impl Into<Value>) -> Result<Self> {
        self.push(property, Source::Param(value.into()))
    }

    /// Let the store generate a unique id for `property` (`randomUUID()`).
    pub fn generated_id(self, property: Property) -> Result<Self> {
        self.push(property, Source::GeneratedId)
    }

    fn push(mut self, property: Property, source: Source) -> Result<Self> {
        check(self.label, property)?;
        self.entries.retain(|(p, _)| *p != property);
        self.entries.push((property, source));
        Ok(self)
    }

    /// Render as `{a: $a, id: randomUUID()}`.
    pub fn render(&self) -> Rendered {
        let mut fragments = Vec::with_capacity(self.entries.len());
        let mut params = Vec::new();
        for (property, source) in &self.entries {
            match source {
                Source::Param(value) => {
                    fragments.push(format!("{property}: ${property}"));
                    params.push((property.as_str().to_string(), value.clone()));
                }
                Source::GeneratedId => fragments.push(format!("{property}: randomUUID()")),
            }
        }
        Rendered {
            pattern: format!("{{{}}}", fragments.join(", ")),
            params,
        }
    }
}

/// An update request: properties to overwrite and properties to remove.
#[derive(Debug, Clone, PartialEq)]
pub struct Changes {
    label: Label,
    set: Vec<(Property, Value)>,
    remove: Vec<Property>,
}

impl Changes {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            set: Vec::new(),
            remove: Vec::new(),
        }
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn set(mut self, property: Property, value: impl Into<Value>) -> Result<Self> {
        check(self.label, property)?;
        self.remove.retain(|p| *p != property);
        self.set.retain(|(p, _)| *p != property);
        self.set.push((property, value.into()));
        Ok(self)
    }

    pub fn remove(mut self, property: Property) -> Result<Self> {
        check_removable(self.label, property)?;
        self.set.retain(|(p, _)| *p != property);
        if !self.remove.contains(&property) {
            self.remove.push(property);
        }
        Ok(self)
    }

    /// Apply one field of a request: set when present and non-empty,
    /// remove when explicitly cleared, otherwise leave untouched.
    pub fn field<T: Into<Value>>(self, property: Property, update: FieldUpdate<T>) -> Result<Self> {
        match update {
            FieldUpdate::Untouched => Ok(self),
            FieldUpdate::Remove => self.remove(property),
            FieldUpdate::Set(value) => {
                let value = value.into();
                if is_blank(&value) {
                    Ok(self)
                } else {
                    self.set(property, value)
                }
            }
        }
    }

    pub fn removed(&self) -> &[Property] {
        &self.remove
    }

    pub fn has_assignments(&self) -> bool {
        !self.set.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    /// `SET n.a = $set_a, n.b = $set_b`, or `None` when nothing is set.
    pub(crate) fn set_clause(&self) -> Option<Rendered> {
        if self.set.is_empty() {
            return None;
        }
        let assignments: Vec<String> = self
            .set
            .iter()
            .map(|(p, _)| format!("{ALIAS}.{p} = $set_{p}"))
            .collect();
        Some(Rendered {
            pattern: format!("SET {}", assignments.join(", ")),
            params: self
                .set
                .iter()
                .map(|(p, v)| (format!("set_{p}"), v.clone()))
                .collect(),
        })
    }
}

/// `REMOVE n.a, n.b`, or `None` when the list is empty.
pub(crate) fn remove_clause(label: Label, properties: &[Property]) -> Result<Option<String>> {
    if properties.is_empty() {
        return Ok(None);
    }
    for property in properties {
        check_removable(label, *property)?;
    }
    let items: Vec<String> = properties.iter().map(|p| format!("{ALIAS}.{p}")).collect();
    Ok(Some(format!("REMOVE {}", items.join(", "))))
}

/// `(alias:Label {prop: $param})` plus its binding.
pub(crate) fn node_pattern(alias: &str, key: &NodeKey, param: &str) -> Result<Rendered> {
    check(key.label, key.property)?;
    Ok(Rendered {
        pattern: format!(
            "({alias}:{label} {{{property}: ${param}}})",
            label = key.label,
            property = key.property
        ),
        params: vec![(param.to_string(), key.value.clone())],
    })
}

fn check(label: Label, property: Property) -> Result<()> {
    if label.allows(property) {
        Ok(())
    } else {
        Err(DataError::new(
            ErrorKind::InvalidProperty,
            format!("{label} nodes have no `{property}` property"),
        )
        .with_data(json!({"label": label, "property": property})))
    }
}

fn check_removable(label: Label, property: Property) -> Result<()> {
    check(label, property)?;
    if property == label.identifying_property() {
        return Err(DataError::new(
            ErrorKind::InvalidProperty,
            format!("`{property}` identifies {label} nodes and cannot be removed"),
        )
        .with_data(json!({"label": label, "property": property})));
    }
    Ok(())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
