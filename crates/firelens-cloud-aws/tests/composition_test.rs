//! Properties of the composed stack

use firelens_cloud::{RemovalPolicy, Template, TemplateFormat};
use firelens_cloud_aws::checks::physical_name;
use firelens_cloud_aws::{FirelensStack, LogPathLayout};
use firelens_core::{Deployment, StackSettings};
use serde_json::{Value, json};
use std::collections::HashSet;

fn build(prefix: &str) -> FirelensStack {
    FirelensStack::build(&Deployment::for_prefix(prefix).unwrap()).unwrap()
}

fn names(built: &FirelensStack) -> Vec<String> {
    built
        .stack()
        .resources()
        .iter()
        .filter_map(physical_name)
        .map(str::to_string)
        .collect()
}

#[test]
fn test_names_contain_prefix_and_do_not_collide() {
    for prefix in ["acme", "team-a", "x1"] {
        let built = build(prefix);
        let names = names(&built);
        assert!(!names.is_empty());

        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len(), "collision for prefix {}", prefix);
        for name in &names {
            assert!(name.contains(prefix), "'{}' misses '{}'", name, prefix);
        }
    }
}

#[test]
fn test_different_prefixes_share_no_names() {
    let a: HashSet<String> = names(&build("alpha")).into_iter().collect();
    let b: HashSet<String> = names(&build("beta")).into_iter().collect();
    assert!(a.is_disjoint(&b));
}

#[test]
fn test_delivery_prefix_matches_catalog_template() {
    let built = build("acme");
    let stack = built.stack();

    let stream = stack.resource("FirehoseStream").unwrap();
    let delivery_prefix = stream
        .property_at(&["S3DestinationConfiguration", "Prefix"])
        .and_then(Value::as_str)
        .unwrap();

    let table = stack.resource("GlueTable").unwrap();
    let template_literal = table
        .property_at(&["TableInput", "Parameters", "storage.location.template"])
        .and_then(|v| v["Fn::Join"][1][2].as_str())
        .unwrap();

    assert_eq!(delivery_prefix, "ecs-logs/");
    assert_eq!(
        LogPathLayout::template_key_prefix(template_literal),
        Some(delivery_prefix)
    );
}

#[test]
fn test_task_policy_targets_resources_of_the_same_run() {
    let built = build("acme");
    let stack = built.stack();
    let policy = stack.resource("PolicyForFirelens").unwrap();

    let resources: Vec<&Value> = policy
        .property_at(&["PolicyDocument", "Statement"])
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .flat_map(|s| s["Resource"].as_array().unwrap())
        .collect();

    assert_eq!(
        resources,
        vec![
            &json!({ "Fn::GetAtt": ["FlaskLog", "Arn"] }),
            &json!({ "Fn::GetAtt": ["FirehoseStream", "Arn"] })
        ]
    );
    assert_eq!(
        stack.resource("FlaskLog").unwrap().resource_type,
        "AWS::Logs::LogGroup"
    );
    assert_eq!(
        stack.resource("FirehoseStream").unwrap().resource_type,
        "AWS::KinesisFirehose::DeliveryStream"
    );
}

#[test]
fn test_log_infra_is_created_first() {
    let built = build("acme");
    let order = built.stack().creation_order().unwrap();

    let position = |id: &str| order.iter().position(|r| r.logical_id == id).unwrap();
    let log_infra: Vec<usize> = order
        .iter()
        .enumerate()
        .filter(|(_, r)| r.construct_path.starts_with("LogInfra/"))
        .map(|(i, _)| i)
        .collect();
    let last_log_infra = *log_infra.iter().max().unwrap();

    for id in ["FlaskLog", "TaskDefinition", "Service", "GlueTable", "AthenaWorkGroup"] {
        assert!(position(id) > last_log_infra, "{} precedes LogInfra", id);
    }
    assert!(position("FirehoseStream") < position("TaskDefinition"));
    assert!(position("LogBucket") < position("GlueTable"));
}

#[test]
fn test_acme_names() {
    let built = build("acme");
    let stack = built.stack();

    let buckets: Vec<&str> = stack
        .resources_of_type("AWS::S3::Bucket")
        .into_iter()
        .filter_map(physical_name)
        .collect();
    assert_eq!(buckets, vec!["acme-log-bucket", "acme-query-result-bucket"]);

    assert_eq!(
        physical_name(stack.resource("GlueDatabase").unwrap()),
        Some("acme-log-database")
    );
    assert_eq!(
        physical_name(stack.resource("GlueTable").unwrap()),
        Some("acme-flask-log")
    );
    assert_eq!(stack.name(), "acme-FirelensStack");
}

#[test]
fn test_no_bucket_or_log_group_is_retained() {
    let built = build("acme");
    for resource in built.stack().resources() {
        if resource.holds_data() && resource.resource_type != "AWS::Logs::LogStream" {
            assert_eq!(
                resource.removal_policy,
                Some(RemovalPolicy::Destroy),
                "{}",
                resource.logical_id
            );
        }
    }
}

#[test]
fn test_checks_pass_for_configured_deployment() {
    let settings = firelens_core::parse_kdl_string(
        r#"
prefix "team-a"
account "123456789012"
region "ap-northeast-1"
network {
    vpc "vpc-0abc"
    subnets "subnet-1" "subnet-2"
}
"#,
    )
    .unwrap();
    let deployment = settings.resolve(None).unwrap();
    let built = FirelensStack::build(&deployment).unwrap();

    for result in built.check() {
        assert!(result.passed, "{}: {}", result.name, result.detail);
    }
    assert!(built.stack().parameters().is_empty());
}

#[test]
fn test_template_synthesis() {
    let built = build("acme");
    let template = Template::synthesize(built.stack()).unwrap();
    let rendered = template.render(TemplateFormat::Json).unwrap();
    let value: Value = serde_json::from_str(&rendered).unwrap();

    assert_eq!(value["Resources"]["LogBucket"]["DeletionPolicy"], json!("Delete"));
    assert_eq!(
        value["Resources"]["FlaskLog"]["Metadata"]["firelens:path"],
        json!("Container/FlaskLog")
    );
    assert_eq!(
        value["Outputs"]["FirehoseStreamName"]["Value"],
        json!({ "Ref": "FirehoseStream" })
    );
    assert!(value["Parameters"].get("VpcId").is_some());
}

#[test]
fn test_missing_prefix_fails_before_composition() {
    let err = StackSettings::default().resolve(None).unwrap_err();
    assert!(matches!(err, firelens_core::CoreError::MissingPrefix));
}
