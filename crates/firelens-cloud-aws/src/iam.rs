//! IAM policy documents

use serde_json::{Map, Value, json};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub principal: Option<Value>,
    pub action: Vec<String>,
    pub resource: Vec<Value>,
}

impl PolicyStatement {
    /// Allow `actions` on `resources`
    pub fn allow<I, S>(actions: I, resources: Vec<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.into_iter().map(Into::into).collect(),
            resource: resources,
        }
    }

    pub fn with_principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut statement = Map::new();
        statement.insert("Effect".into(), json!(self.effect.as_str()));
        if let Some(principal) = &self.principal {
            statement.insert("Principal".into(), principal.clone());
        }
        statement.insert("Action".into(), json!(self.action));
        statement.insert("Resource".into(), Value::Array(self.resource.clone()));
        Value::Object(statement)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDocument {
    pub version: &'static str,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION,
            statement,
        }
    }

    pub fn to_value(&self) -> Value {
        let statements: Vec<Value> = self.statement.iter().map(PolicyStatement::to_value).collect();
        json!({ "Version": self.version, "Statement": statements })
    }
}

/// Assume-role policy trusting an AWS service principal
pub fn service_trust(service: &str) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole"
        }]
    })
}
