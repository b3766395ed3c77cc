//! Resource descriptors

use crate::token;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// What happens to the physical resource when it leaves the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Delete on teardown
    Destroy,
    /// Orphan the physical resource
    Retain,
    /// Snapshot, then delete (databases / volumes only)
    Snapshot,
}

impl RemovalPolicy {
    /// Value for `DeletionPolicy` / `UpdateReplacePolicy`
    pub fn deletion_policy(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Snapshot => "Snapshot",
        }
    }

    pub fn from_deletion_policy(value: &str) -> Option<Self> {
        match value {
            "Delete" => Some(RemovalPolicy::Destroy),
            "Retain" => Some(RemovalPolicy::Retain),
            "Snapshot" => Some(RemovalPolicy::Snapshot),
            _ => None,
        }
    }
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Destroy => write!(f, "destroy"),
            RemovalPolicy::Retain => write!(f, "retain"),
            RemovalPolicy::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// A single declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Template-local identifier
    pub logical_id: String,

    /// Resource type (e.g., "AWS::S3::Bucket")
    pub resource_type: String,

    /// `<Construct>/<Id>` of the component that declared it
    pub construct_path: String,

    /// Resource-specific properties
    pub properties: Map<String, Value>,

    /// Explicit ordering edges in addition to token references
    pub depends_on: Vec<String>,

    pub removal_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(logical_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let logical_id = logical_id.into();
        Self {
            construct_path: logical_id.clone(),
            logical_id,
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            removal_policy: None,
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    pub fn depends_on(mut self, target: &ResourceRef) -> Self {
        if !self.depends_on.contains(&target.logical_id) {
            self.depends_on.push(target.logical_id.clone());
        }
        self
    }

    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Look up a nested property by path, e.g. `["TableInput", "Name"]`
    pub fn property_at(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.properties.get(*first)?;
        for key in rest {
            current = current.get(*key)?;
        }
        Some(current)
    }

    /// Every logical id this resource needs to exist first
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = token::referenced_ids(&Value::Object(self.properties.clone()));
        deps.extend(self.depends_on.iter().cloned());
        deps.remove(&self.logical_id);
        deps
    }

    /// Whether removing this resource destroys stored data
    pub fn holds_data(&self) -> bool {
        matches!(
            self.resource_type.as_str(),
            "AWS::S3::Bucket" | "AWS::Logs::LogGroup" | "AWS::Logs::LogStream"
        )
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            logical_id: self.logical_id.clone(),
            resource_type: self.resource_type.clone(),
        }
    }
}

/// Handle to a resource already added to a stack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    logical_id: String,
    resource_type: String,
}

impl ResourceRef {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// `{"Ref": id}` (name / id depending on the type)
    pub fn to_ref(&self) -> Value {
        token::reference(&self.logical_id)
    }

    /// `{"Fn::GetAtt": [id, attribute]}`
    pub fn get_att(&self, attribute: &str) -> Value {
        token::get_att(&self.logical_id, attribute)
    }

    /// `{"Fn::GetAtt": [id, "Arn"]}`
    pub fn arn(&self) -> Value {
        self.get_att("Arn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dependencies_from_tokens_and_depends_on() {
        let bucket = Resource::new("LogBucket", "AWS::S3::Bucket");
        let policy = Resource::new("RolePolicy", "AWS::IAM::Policy");

        let stream = Resource::new("FirehoseStream", "AWS::KinesisFirehose::DeliveryStream")
            .property(
                "S3DestinationConfiguration",
                json!({ "BucketARN": bucket.reference().arn() }),
            )
            .depends_on(&policy.reference());

        let deps = stream.dependencies();
        assert!(deps.contains("LogBucket"));
        assert!(deps.contains("RolePolicy"));
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_depends_on_is_deduplicated() {
        let target = Resource::new("A", "AWS::SNS::Topic").reference();
        let resource = Resource::new("B", "AWS::SNS::Topic")
            .depends_on(&target)
            .depends_on(&target);
        assert_eq!(resource.depends_on, vec!["A"]);
    }

    #[test]
    fn test_property_at() {
        let table = Resource::new("GlueTable", "AWS::Glue::Table")
            .property("TableInput", json!({ "Name": "acme-flask-log" }));

        assert_eq!(
            table.property_at(&["TableInput", "Name"]),
            Some(&json!("acme-flask-log"))
        );
        assert!(table.property_at(&["TableInput", "Missing"]).is_none());
        assert!(table.property_at(&[]).is_none());
    }

    #[test]
    fn test_removal_policy_round_trip() {
        for policy in [
            RemovalPolicy::Destroy,
            RemovalPolicy::Retain,
            RemovalPolicy::Snapshot,
        ] {
            assert_eq!(
                RemovalPolicy::from_deletion_policy(policy.deletion_policy()),
                Some(policy)
            );
        }
    }

    #[test]
    fn test_holds_data() {
        assert!(Resource::new("B", "AWS::S3::Bucket").holds_data());
        assert!(Resource::new("L", "AWS::Logs::LogGroup").holds_data());
        assert!(!Resource::new("R", "AWS::IAM::Role").holds_data());
    }
}
