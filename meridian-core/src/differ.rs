//! Differ - Compare desired state with observed state
//!
//! Compares the desired resource declared in configuration with the state read
//! back from the Provider, and decides whether the resource must be created,
//! updated in place, replaced, or left alone.

use std::collections::HashMap;

use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences in mutable attributes -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// An immutable attribute changed -> delete and create again
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: &ResourceSchema) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let forces_replacement = changed.iter().any(|name| {
        schema
            .attributes
            .get(name)
            .is_some_and(|attr| attr.force_new)
    });

    if forces_replacement {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Names of desired attributes whose value differs from the current one, sorted
pub fn changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: &ResourceSchema,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        let same = match (current.get(key), schema.attributes.get(key)) {
            (Some(current_value), Some(attr)) => {
                attr.attr_type.values_equal(desired_value, current_value)
            }
            (Some(current_value), None) => current_value == desired_value,
            // An empty collection is indistinguishable from an unset one remotely
            (None, _) => matches!(desired_value, Value::List(items) if items.is_empty()),
        };
        if !same {
            changed.push(key.clone());
        }
    }

    changed.sort();
    changed
}
