//! Template synthesis
//!
//! Renders a [`Stack`] into a CloudFormation template document.

use crate::error::{CloudError, Result};
use crate::resource::RemovalPolicy;
use crate::stack::{Output, Parameter, Stack};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const FORMAT_VERSION: &str = "2010-09-09";

/// Metadata key recording which construct declared a resource
pub const PATH_METADATA_KEY: &str = "firelens:path";

/// Output document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yaml",
        }
    }
}

impl std::str::FromStr for TemplateFormat {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            other => Err(CloudError::InvalidConfig(format!(
                "unknown template format: {}",
                other
            ))),
        }
    }
}

/// One entry of the `Resources` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TemplateResource {
    pub fn removal_policy(&self) -> Option<RemovalPolicy> {
        self.deletion_policy
            .as_deref()
            .and_then(RemovalPolicy::from_deletion_policy)
    }

    pub fn construct_path(&self) -> Option<&str> {
        self.metadata.get(PATH_METADATA_KEY).and_then(Value::as_str)
    }
}

/// A synthesized template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,

    /// Kept in creation order
    pub resources: Map<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    /// Synthesize a stack; resources are emitted in creation order
    pub fn synthesize(stack: &Stack) -> Result<Self> {
        let mut resources = Map::new();

        for resource in stack.creation_order()? {
            let policy = resource.removal_policy.map(|p| p.deletion_policy().to_string());
            let mut metadata = Map::new();
            metadata.insert(
                PATH_METADATA_KEY.to_string(),
                Value::String(resource.construct_path.clone()),
            );

            let entry = TemplateResource {
                resource_type: resource.resource_type.clone(),
                properties: resource.properties.clone(),
                depends_on: resource.depends_on.clone(),
                deletion_policy: policy.clone(),
                update_replace_policy: policy,
                metadata,
            };
            resources.insert(resource.logical_id.clone(), serde_json::to_value(entry)?);
        }

        tracing::debug!(
            stack = %stack.name(),
            resources = resources.len(),
            "Synthesized template"
        );

        Ok(Self {
            format_version: FORMAT_VERSION.to_string(),
            description: stack.description().map(str::to_string),
            parameters: stack.parameters().clone(),
            resources,
            outputs: stack.outputs().clone(),
        })
    }

    pub fn resource(&self, logical_id: &str) -> Option<TemplateResource> {
        self.resources
            .get(logical_id)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &String> {
        self.resources.keys()
    }

    pub fn render(&self, format: TemplateFormat) -> Result<String> {
        match format {
            TemplateFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            TemplateFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }

    pub fn parse(content: &str, format: TemplateFormat) -> Result<Self> {
        match format {
            TemplateFormat::Json => Ok(serde_json::from_str(content)?),
            TemplateFormat::Yaml => Ok(serde_yaml::from_str(content)?),
        }
    }
}
