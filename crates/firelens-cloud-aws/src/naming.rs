//! Physical resource names
//!
//! Every name is derived from the deployment prefix, so two deployments with
//! different prefixes never collide and one deployment never reuses a name.

use firelens_core::{Deployment, Prefix};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    prefix: Prefix,
    account: Option<String>,
}

impl Naming {
    /// `account` is appended to bucket names, which are global
    pub fn new(prefix: Prefix, account: Option<String>) -> Self {
        Self { prefix, account }
    }

    pub fn from_deployment(deployment: &Deployment) -> Self {
        Self::new(deployment.prefix.clone(), deployment.account.clone())
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix, suffix)
    }

    fn bucket(&self, suffix: &str) -> String {
        match &self.account {
            Some(account) => format!("{}-{}-{}", self.prefix, suffix, account),
            None => self.name(suffix),
        }
    }

    // LogInfra

    pub fn log_bucket(&self) -> String {
        self.bucket("log-bucket")
    }

    pub fn delivery_stream(&self) -> String {
        self.name("firehose-stream")
    }

    pub fn delivery_role(&self) -> String {
        self.name("delivery-stream-role")
    }

    pub fn delivery_fail_log_group(&self) -> String {
        format!("/aws/kinesisfirehose/{}", self.name("stream-fail-log"))
    }

    pub fn auto_delete_function(&self) -> String {
        self.name("auto-delete-objects")
    }

    pub fn auto_delete_role(&self) -> String {
        self.name("auto-delete-objects-role")
    }

    // Container

    pub fn app_log_group(&self) -> String {
        self.name("flask-error-log")
    }

    pub fn router_log_group(&self) -> String {
        self.name("firelens-log")
    }

    pub fn cluster(&self) -> String {
        self.name("cluster")
    }

    pub fn service(&self) -> String {
        self.name("service")
    }

    pub fn task_family(&self) -> String {
        self.name("task")
    }

    pub fn execution_role(&self) -> String {
        self.name("task-execution-role")
    }

    pub fn task_role(&self) -> String {
        self.name("task-role")
    }

    pub fn load_balancer(&self) -> String {
        self.name("alb")
    }

    pub fn target_group(&self) -> String {
        self.name("tg")
    }

    pub fn task_policy(&self) -> String {
        self.name("policy-for-firelens")
    }

    // DataInfra

    pub fn query_result_bucket(&self) -> String {
        self.bucket("query-result-bucket")
    }

    pub fn work_group(&self) -> String {
        self.name("athenaWorkGroup")
    }

    pub fn database(&self) -> String {
        self.name("log-database")
    }

    pub fn table(&self) -> String {
        self.name("flask-log")
    }

    /// Every physical name with a short label, in component order
    pub fn all(&self) -> Vec<(&'static str, String)> {
        vec![
            ("log bucket", self.log_bucket()),
            ("delivery stream", self.delivery_stream()),
            ("delivery role", self.delivery_role()),
            ("delivery fail log group", self.delivery_fail_log_group()),
            ("auto-delete function", self.auto_delete_function()),
            ("auto-delete role", self.auto_delete_role()),
            ("app log group", self.app_log_group()),
            ("router log group", self.router_log_group()),
            ("cluster", self.cluster()),
            ("service", self.service()),
            ("task family", self.task_family()),
            ("execution role", self.execution_role()),
            ("task role", self.task_role()),
            ("load balancer", self.load_balancer()),
            ("target group", self.target_group()),
            ("task policy", self.task_policy()),
            ("query result bucket", self.query_result_bucket()),
            ("work group", self.work_group()),
            ("database", self.database()),
            ("table", self.table()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn naming(prefix: &str) -> Naming {
        Naming::new(Prefix::new(prefix).unwrap(), None)
    }

    #[test]
    fn test_names_for_acme() {
        let naming = naming("acme");
        assert_eq!(naming.database(), "acme-log-database");
        assert_eq!(naming.table(), "acme-flask-log");
        assert_eq!(naming.work_group(), "acme-athenaWorkGroup");
        assert_eq!(naming.delivery_stream(), "acme-firehose-stream");
        assert_eq!(
            naming.delivery_fail_log_group(),
            "/aws/kinesisfirehose/acme-stream-fail-log"
        );
        assert_ne!(naming.log_bucket(), naming.query_result_bucket());
    }

    #[test]
    fn test_all_names_contain_prefix_and_are_unique() {
        let naming = naming("team-a");
        let names = naming.all();

        let unique: HashSet<&String> = names.iter().map(|(_, n)| n).collect();
        assert_eq!(unique.len(), names.len());
        for (label, name) in &names {
            assert!(name.contains("team-a"), "{} '{}' misses the prefix", label, name);
        }
    }

    #[test]
    fn test_app_log_group_does_not_shadow_table() {
        let naming = naming("acme");
        assert_ne!(naming.app_log_group(), naming.table());
    }

    #[test]
    fn test_bucket_names_with_account() {
        let naming = Naming::new(Prefix::new("acme").unwrap(), Some("123456789012".into()));
        assert_eq!(naming.log_bucket(), "acme-log-bucket-123456789012");
        assert_eq!(naming.query_result_bucket(), "acme-query-result-bucket-123456789012");
        assert_eq!(naming.table(), "acme-flask-log");
    }

    #[test]
    fn test_longest_prefix_fits_service_limits() {
        let naming = naming("abcdefghijklmnopqrst");
        // ALB and target group names are limited to 32 characters
        assert!(naming.load_balancer().len() <= 32);
        assert!(naming.target_group().len() <= 32);
        assert!(naming.log_bucket().len() <= 63);
    }
}
