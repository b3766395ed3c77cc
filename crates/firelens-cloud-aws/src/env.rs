//! Account / region binding
//!
//! When the settings pin an account and region, ARNs and image URIs are
//! emitted as literals; otherwise they are `Fn::Sub` tokens over the
//! pseudo parameters and resolve at deploy time.

use firelens_cloud::token;
use firelens_core::Deployment;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsEnv {
    account: Option<String>,
    region: Option<String>,
}

impl AwsEnv {
    pub fn new(account: Option<String>, region: Option<String>) -> Self {
        Self { account, region }
    }

    pub fn from_deployment(deployment: &Deployment) -> Self {
        Self::new(deployment.account.clone(), deployment.region.clone())
    }

    fn is_pinned(&self) -> bool {
        self.account.is_some() && self.region.is_some()
    }

    fn account_part(&self) -> String {
        self.account
            .clone()
            .unwrap_or_else(|| "${AWS::AccountId}".to_string())
    }

    fn region_part(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| "${AWS::Region}".to_string())
    }

    fn render(&self, text: String) -> Value {
        if self.is_pinned() {
            Value::String(text)
        } else {
            token::sub(text)
        }
    }

    /// Account id for `CatalogId` and similar properties
    pub fn account_id(&self) -> Value {
        match &self.account {
            Some(account) => Value::String(account.clone()),
            None => token::reference("AWS::AccountId"),
        }
    }

    pub fn region(&self) -> Value {
        match &self.region {
            Some(region) => Value::String(region.clone()),
            None => token::reference("AWS::Region"),
        }
    }

    /// `arn:aws:<service>:<region>:<account>:<resource>`
    pub fn arn(&self, service: &str, resource: &str) -> Value {
        self.render(format!(
            "arn:aws:{}:{}:{}:{}",
            service,
            self.region_part(),
            self.account_part(),
            resource
        ))
    }

    /// Image URI of a repository in this account's registry
    pub fn ecr_image(&self, repository: &str, tag: &str) -> Value {
        if self.is_pinned() {
            self.render(format!(
                "{}.dkr.ecr.{}.amazonaws.com/{}:{}",
                self.account_part(),
                self.region_part(),
                repository,
                tag
            ))
        } else {
            token::sub(format!(
                "{}.dkr.ecr.{}.${{AWS::URLSuffix}}/{}:{}",
                self.account_part(),
                self.region_part(),
                repository,
                tag
            ))
        }
    }
}
