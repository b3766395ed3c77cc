//! Stack composition
//!
//! A [`Stack`] is an append-only resource graph. A resource may only reference
//! resources (or parameters) that were added before it, so insertion order is
//! always a valid creation order and components must be composed leaves first.

use crate::error::{CloudError, Result};
use crate::resource::{Resource, ResourceRef};
use crate::token;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// A component that declares a group of resources under its own scope
///
/// Inputs are carried by the implementing value; outputs are typed handles
/// for downstream components.
pub trait Construct {
    type Output;
    type Error: From<CloudError>;

    /// Scope id, also the first segment of every construct path
    fn id(&self) -> &str;

    fn build(self, scope: &mut Scope<'_>) -> std::result::Result<Self::Output, Self::Error>;
}

/// Template parameter supplied at deploy time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Parameter {
    pub fn new(parameter_type: impl Into<String>) -> Self {
        Self {
            parameter_type: parameter_type.into(),
            description: None,
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Stack output value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Output {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Resource graph for a single deployment
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    description: Option<String>,
    parameters: BTreeMap<String, Parameter>,
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    outputs: BTreeMap<String, Output>,
    constructs: Vec<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: BTreeMap::new(),
            resources: Vec::new(),
            index: HashMap::new(),
            outputs: BTreeMap::new(),
            constructs: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Compose a construct under its own scope
    pub fn compose<C: Construct>(&mut self, construct: C) -> std::result::Result<C::Output, C::Error> {
        let id = construct.id().to_string();
        if self.constructs.contains(&id) {
            return Err(CloudError::DuplicateResource(format!("construct {}", id)).into());
        }

        info!(stack = %self.name, construct = %id, "Composing construct");
        let before = self.resources.len();

        let output = {
            let mut scope = Scope {
                stack: self,
                path: id.clone(),
            };
            construct.build(&mut scope)?
        };

        debug!(
            construct = %id,
            resources = self.resources.len() - before,
            "Construct composed"
        );
        self.constructs.push(id);
        Ok(output)
    }

    /// Construct ids in composition order
    pub fn constructs(&self) -> &[String] {
        &self.constructs
    }

    /// Add a deploy-time parameter and return its `Ref` token
    pub fn add_parameter(&mut self, id: impl Into<String>, parameter: Parameter) -> Result<Value> {
        let id = id.into();
        if self.parameters.contains_key(&id) || self.index.contains_key(&id) {
            return Err(CloudError::DuplicateResource(id));
        }
        let token = token::reference(&id);
        self.parameters.insert(id, parameter);
        Ok(token)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    /// Add a resource; every id it references must already exist
    pub fn add_resource(&mut self, resource: Resource) -> Result<ResourceRef> {
        let id = resource.logical_id.clone();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CloudError::InvalidResource(format!(
                "logical id must be non-empty alphanumeric: '{}'",
                id
            )));
        }
        if self.index.contains_key(&id) || self.parameters.contains_key(&id) {
            return Err(CloudError::DuplicateResource(id));
        }

        for target in resource.dependencies() {
            if !self.is_known(&target) {
                return Err(CloudError::UnresolvedReference {
                    resource: id,
                    target,
                });
            }
        }

        debug!(
            logical_id = %id,
            resource_type = %resource.resource_type,
            path = %resource.construct_path,
            "Added resource"
        );
        let handle = resource.reference();
        self.index.insert(id, self.resources.len());
        self.resources.push(resource);
        Ok(handle)
    }

    pub fn add_output(&mut self, id: impl Into<String>, output: Output) -> Result<()> {
        let id = id.into();
        if self.outputs.contains_key(&id) {
            return Err(CloudError::DuplicateResource(format!("output {}", id)));
        }
        for target in token::referenced_ids(&output.value) {
            if !self.is_known(&target) {
                return Err(CloudError::UnresolvedReference {
                    resource: format!("output {}", id),
                    target,
                });
            }
        }
        self.outputs.insert(id, output);
        Ok(())
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    fn is_known(&self, id: &str) -> bool {
        self.index.contains_key(id) || self.parameters.contains_key(id)
    }

    /// Resources in insertion order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.index.get(logical_id).map(|&i| &self.resources[i])
    }

    pub fn resources_of_type(&self, resource_type: &str) -> Vec<&Resource> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    /// Resources declared by the given construct
    pub fn resources_in(&self, construct: &str) -> Vec<&Resource> {
        let prefix = format!("{}/", construct);
        self.resources
            .iter()
            .filter(|r| r.construct_path.starts_with(&prefix))
            .collect()
    }

    /// Resource ids (not parameters) the given resource depends on
    pub fn dependencies_of(&self, logical_id: &str) -> BTreeSet<String> {
        self.resource(logical_id)
            .map(|r| {
                r.dependencies()
                    .into_iter()
                    .filter(|d| self.index.contains_key(d))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stable topological order of all resources
    ///
    /// Ties are broken by insertion order.
    pub fn creation_order(&self) -> Result<Vec<&Resource>> {
        let count = self.resources.len();
        let mut indegree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for (i, resource) in self.resources.iter().enumerate() {
            for dep in self.dependencies_of(&resource.logical_id) {
                let j = self.index[&dep];
                indegree[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(i) = ready.pop_first() {
            order.push(&self.resources[i]);
            for &k in &dependents[i] {
                indegree[k] -= 1;
                if indegree[k] == 0 {
                    ready.insert(k);
                }
            }
        }

        if order.len() != count {
            let stuck: Vec<&str> = (0..count)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.resources[i].logical_id.as_str())
                .collect();
            return Err(CloudError::CircularDependency(stuck.join(", ")));
        }

        Ok(order)
    }
}

/// Handle a construct uses to add resources to the stack
pub struct Scope<'a> {
    stack: &'a mut Stack,
    path: String,
}

impl Scope<'_> {
    /// Scope id (the construct id)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn stack(&self) -> &Stack {
        self.stack
    }

    /// Add a resource, recording this scope in its construct path
    pub fn add(&mut self, mut resource: Resource) -> Result<ResourceRef> {
        resource.construct_path = format!("{}/{}", self.path, resource.logical_id);
        self.stack.add_resource(resource)
    }

    /// Add a parameter, or return the existing one's token
    pub fn parameter(&mut self, id: &str, parameter: Parameter) -> Result<Value> {
        if self.stack.parameters.contains_key(id) {
            return Ok(token::reference(id));
        }
        self.stack.add_parameter(id, parameter)
    }

    pub fn output(&mut self, id: impl Into<String>, output: Output) -> Result<()> {
        self.stack.add_output(id, output)
    }

    /// Handle to a resource added earlier by any construct
    pub fn find(&self, logical_id: &str) -> Option<ResourceRef> {
        self.stack.resource(logical_id).map(Resource::reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Buckets;

    impl Construct for Buckets {
        type Output = ResourceRef;
        type Error = CloudError;

        fn id(&self) -> &str {
            "Buckets"
        }

        fn build(self, scope: &mut Scope<'_>) -> Result<ResourceRef> {
            scope.add(Resource::new("DataBucket", "AWS::S3::Bucket"))
        }
    }

    struct Reader<'a> {
        bucket: &'a ResourceRef,
    }

    impl Construct for Reader<'_> {
        type Output = ();
        type Error = CloudError;

        fn id(&self) -> &str {
            "Reader"
        }

        fn build(self, scope: &mut Scope<'_>) -> Result<()> {
            scope.add(
                Resource::new("ReaderRole", "AWS::IAM::Role")
                    .property("Resource", self.bucket.arn()),
            )?;
            Ok(())
        }
    }

    #[test]
    fn test_compose_records_paths_and_order() {
        let mut stack = Stack::new("test");
        let bucket = stack.compose(Buckets).unwrap();
        stack.compose(Reader { bucket: &bucket }).unwrap();

        assert_eq!(stack.constructs(), &["Buckets", "Reader"]);
        assert_eq!(
            stack.resource("DataBucket").unwrap().construct_path,
            "Buckets/DataBucket"
        );
        assert_eq!(stack.resources_in("Reader").len(), 1);
        assert!(stack.dependencies_of("ReaderRole").contains("DataBucket"));
    }

    #[test]
    fn test_compose_same_construct_twice_fails() {
        let mut stack = Stack::new("test");
        stack.compose(Buckets).unwrap();
        assert!(stack.compose(Buckets).is_err());
    }

    #[test]
    fn test_duplicate_resource() {
        let mut stack = Stack::new("test");
        stack
            .add_resource(Resource::new("A", "AWS::SNS::Topic"))
            .unwrap();
        let err = stack
            .add_resource(Resource::new("A", "AWS::SNS::Topic"))
            .unwrap_err();
        assert!(matches!(err, CloudError::DuplicateResource(_)));
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let mut stack = Stack::new("test");
        let err = stack
            .add_resource(
                Resource::new("Stream", "AWS::KinesisFirehose::DeliveryStream")
                    .property("Bucket", json!({ "Ref": "LaterBucket" })),
            )
            .unwrap_err();

        match err {
            CloudError::UnresolvedReference { resource, target } => {
                assert_eq!(resource, "Stream");
                assert_eq!(target, "LaterBucket");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_logical_id() {
        let mut stack = Stack::new("test");
        assert!(
            stack
                .add_resource(Resource::new("log-bucket", "AWS::S3::Bucket"))
                .is_err()
        );
    }

    #[test]
    fn test_parameter_references_resolve() {
        let mut stack = Stack::new("test");
        let vpc = stack
            .add_parameter("VpcId", Parameter::new("AWS::EC2::VPC::Id"))
            .unwrap();
        stack
            .add_resource(Resource::new("Sg", "AWS::EC2::SecurityGroup").property("VpcId", vpc))
            .unwrap();

        // Parameters are not resource dependencies
        assert!(stack.dependencies_of("Sg").is_empty());
        assert!(
            stack
                .add_parameter("VpcId", Parameter::new("String"))
                .is_err()
        );
    }

    #[test]
    fn test_output_must_reference_known_ids() {
        let mut stack = Stack::new("test");
        let err = stack
            .add_output("Url", Output::new(json!({ "Fn::GetAtt": ["LB", "DNSName"] })))
            .unwrap_err();
        assert!(matches!(err, CloudError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_creation_order_is_topological_and_stable() {
        let mut stack = Stack::new("test");
        let a = stack
            .add_resource(Resource::new("A", "AWS::S3::Bucket"))
            .unwrap();
        let b = stack
            .add_resource(Resource::new("B", "AWS::S3::Bucket"))
            .unwrap();
        stack
            .add_resource(
                Resource::new("C", "AWS::IAM::Policy")
                    .property("Resources", json!([a.arn(), b.arn()])),
            )
            .unwrap();
        stack
            .add_resource(Resource::new("D", "AWS::SNS::Topic").depends_on(&a))
            .unwrap();

        let order: Vec<&str> = stack
            .creation_order()
            .unwrap()
            .iter()
            .map(|r| r.logical_id.as_str())
            .collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }
}
