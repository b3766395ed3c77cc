//! Planned changes between the recorded state and the desired stack

use crate::error::Result;
use crate::resource::Resource;
use crate::stack::Stack;
use crate::state::{ResourceState, StackState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Represents a planned action for a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for the action
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource type (e.g., "AWS::S3::Bucket")
    pub resource_type: String,

    /// Logical id of the resource
    pub resource_id: String,

    /// Description of the action
    pub description: String,

    /// Deleting this resource destroys stored data
    pub destructive: bool,

    /// Additional details about the action
    pub details: HashMap<String, serde_json::Value>,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Plan containing all actions to be applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// List of actions to perform
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    /// Diff the desired stack against the last recorded state
    ///
    /// Creates and updates follow creation order; deletions come last.
    pub fn diff(recorded: Option<&StackState>, desired: &Stack) -> Result<Self> {
        let mut actions = Vec::new();
        let mut seen = BTreeSet::new();

        for resource in desired.creation_order()? {
            seen.insert(resource.logical_id.clone());
            let previous = recorded.and_then(|s| s.resources.get(&resource.logical_id));
            actions.push(match previous {
                None => create_action(resource),
                Some(previous) => {
                    let changed = previous.changed_fields(resource);
                    if changed.is_empty() {
                        noop_action(resource)
                    } else {
                        update_action(resource, previous, changed)
                    }
                }
            });
        }

        if let Some(recorded) = recorded {
            for (id, previous) in &recorded.resources {
                if !seen.contains(id) {
                    actions.push(delete_action(id, previous));
                }
            }
        }

        Ok(Self::new(actions))
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Deletions that would destroy stored data
    pub fn destructive_actions(&self) -> Vec<&Action> {
        self.actions.iter().filter(|a| a.destructive).collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

fn create_action(resource: &Resource) -> Action {
    Action {
        id: format!("create-{}", resource.logical_id),
        action_type: ActionType::Create,
        resource_type: resource.resource_type.clone(),
        resource_id: resource.logical_id.clone(),
        description: format!("Create {} ({})", resource.logical_id, resource.resource_type),
        destructive: false,
        details: [(
            "path".to_string(),
            serde_json::json!(resource.construct_path),
        )]
        .into_iter()
        .collect(),
    }
}

fn noop_action(resource: &Resource) -> Action {
    Action {
        id: format!("noop-{}", resource.logical_id),
        action_type: ActionType::NoOp,
        resource_type: resource.resource_type.clone(),
        resource_id: resource.logical_id.clone(),
        description: format!("{} unchanged", resource.logical_id),
        destructive: false,
        details: Default::default(),
    }
}

fn update_action(resource: &Resource, previous: &ResourceState, changed: Vec<String>) -> Action {
    // A type change replaces the resource; the old one is deleted
    let replaced = previous.resource_type != resource.resource_type;
    Action {
        id: format!("update-{}", resource.logical_id),
        action_type: ActionType::Update,
        resource_type: resource.resource_type.clone(),
        resource_id: resource.logical_id.clone(),
        description: format!(
            "Update {} ({})",
            resource.logical_id,
            changed.join(", ")
        ),
        destructive: replaced && previous.holds_data(),
        details: [
            ("changed".to_string(), serde_json::json!(changed)),
            ("replacement".to_string(), serde_json::json!(replaced)),
        ]
        .into_iter()
        .collect(),
    }
}

fn delete_action(logical_id: &str, previous: &ResourceState) -> Action {
    Action {
        id: format!("delete-{}", logical_id),
        action_type: ActionType::Delete,
        resource_type: previous.resource_type.clone(),
        resource_id: logical_id.to_string(),
        description: format!("Delete {} ({})", logical_id, previous.resource_type),
        destructive: previous.holds_data() && previous.is_destroyed_on_removal(),
        details: [(
            "path".to_string(),
            serde_json::json!(previous.construct_path),
        )]
        .into_iter()
        .collect(),
    }
}

/// Summary of planned actions
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}
