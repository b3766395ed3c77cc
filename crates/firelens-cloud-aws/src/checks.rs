//! Composition checks
//!
//! Properties every synthesized FireLens stack must have. They hold by
//! construction; `validate` re-derives them from the finished graph so a
//! regression in any component shows up before deployment.

use crate::container;
use crate::data_infra;
use crate::error::{AwsError, Result};
use crate::layout::LogPathLayout;
use crate::log_infra;
use crate::naming::Naming;
use crate::s3::emptied_buckets;
use firelens_cloud::{RemovalPolicy, Resource, Stack};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn from_result(name: &'static str, result: std::result::Result<String, String>) -> Self {
        match result {
            Ok(detail) => Self {
                name,
                passed: true,
                detail,
            },
            Err(detail) => Self {
                name,
                passed: false,
                detail,
            },
        }
    }
}

type Outcome = std::result::Result<String, String>;

pub fn run(stack: &Stack, naming: &Naming, layout: &LogPathLayout) -> Vec<CheckResult> {
    vec![
        CheckResult::from_result(
            "names-prefixed-and-unique",
            names_prefixed_and_unique(stack, naming),
        ),
        CheckResult::from_result(
            "delivery-prefix-matches-catalog",
            delivery_prefix_matches_catalog(stack, layout),
        ),
        CheckResult::from_result(
            "partition-layout-matches-delivery",
            partition_layout_matches_delivery(stack, layout),
        ),
        CheckResult::from_result("task-policy-targets", task_policy_targets(stack, naming)),
        CheckResult::from_result("creation-order", creation_order(stack)),
        CheckResult::from_result("catalog-names", catalog_names(stack, naming)),
        CheckResult::from_result("teardown-policy", teardown_policy(stack)),
    ]
}

/// Fail with the first failed check
pub fn ensure_passed(results: &[CheckResult]) -> Result<()> {
    match results.iter().find(|r| !r.passed) {
        Some(failed) => Err(AwsError::CheckFailed(format!(
            "{}: {}",
            failed.name, failed.detail
        ))),
        None => Ok(()),
    }
}

/// Property holding the physical name of a resource type
fn name_path(resource_type: &str) -> Option<&'static [&'static str]> {
    let path: &'static [&'static str] = match resource_type {
        "AWS::S3::Bucket" => &["BucketName"],
        "AWS::KinesisFirehose::DeliveryStream" => &["DeliveryStreamName"],
        "AWS::Logs::LogGroup" => &["LogGroupName"],
        "AWS::IAM::Role" => &["RoleName"],
        "AWS::IAM::ManagedPolicy" => &["ManagedPolicyName"],
        "AWS::ECS::Cluster" => &["ClusterName"],
        "AWS::ECS::Service" => &["ServiceName"],
        "AWS::ECS::TaskDefinition" => &["Family"],
        "AWS::ElasticLoadBalancingV2::LoadBalancer" => &["Name"],
        "AWS::ElasticLoadBalancingV2::TargetGroup" => &["Name"],
        "AWS::Lambda::Function" => &["FunctionName"],
        "AWS::Athena::WorkGroup" => &["Name"],
        "AWS::Glue::Database" => &["DatabaseInput", "Name"],
        "AWS::Glue::Table" => &["TableInput", "Name"],
        _ => return None,
    };
    Some(path)
}

/// Physical name of a named resource, if it has one
pub fn physical_name(resource: &Resource) -> Option<&str> {
    name_path(&resource.resource_type)
        .and_then(|path| resource.property_at(path))
        .and_then(Value::as_str)
}

fn names_prefixed_and_unique(stack: &Stack, naming: &Naming) -> Outcome {
    let prefix = naming.prefix().as_str();
    let mut seen: HashMap<&str, &str> = HashMap::new();

    for resource in stack.resources() {
        let Some(path) = name_path(&resource.resource_type) else {
            continue;
        };
        let name = resource
            .property_at(path)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{} has no literal name", resource.logical_id))?;

        if !name.contains(prefix) {
            return Err(format!(
                "{} name '{}' does not contain prefix '{}'",
                resource.logical_id, name, prefix
            ));
        }
        if let Some(other) = seen.insert(name, &resource.logical_id) {
            return Err(format!(
                "'{}' is used by both {} and {}",
                name, other, resource.logical_id
            ));
        }
    }

    Ok(format!("{} names carry '{}'", seen.len(), prefix))
}

/// Logical id inside `{"Fn::GetAtt": [id, "Arn"]}`
fn get_att_arn_target(value: &Value) -> Option<&str> {
    let parts = value.get("Fn::GetAtt")?.as_array()?;
    match parts.as_slice() {
        [id, attr] if attr == "Arn" => id.as_str(),
        _ => None,
    }
}

/// Logical id inside `{"Ref": id}`
fn ref_target(value: &Value) -> Option<&str> {
    value.get("Ref")?.as_str()
}

fn delivery_prefix_matches_catalog(stack: &Stack, layout: &LogPathLayout) -> Outcome {
    let stream = stack
        .resources_of_type("AWS::KinesisFirehose::DeliveryStream")
        .into_iter()
        .next()
        .ok_or("no delivery stream")?;
    let destination = stream
        .get_property("S3DestinationConfiguration")
        .ok_or("delivery stream has no S3 destination")?;
    let delivery_prefix = destination
        .get("Prefix")
        .and_then(Value::as_str)
        .ok_or("delivery stream has no prefix")?;
    let delivery_bucket = destination
        .get("BucketARN")
        .and_then(get_att_arn_target)
        .ok_or("delivery stream bucket is not a bucket reference")?;

    let table = stack
        .resources_of_type("AWS::Glue::Table")
        .into_iter()
        .next()
        .ok_or("no catalog table")?;
    let parts = table
        .property_at(&["TableInput", "Parameters", "storage.location.template"])
        .and_then(|v| v.get("Fn::Join"))
        .and_then(|v| v.get(1))
        .and_then(Value::as_array)
        .ok_or("catalog table has no location template")?;
    let [scheme, bucket, path] = parts.as_slice() else {
        return Err("unexpected location template shape".to_string());
    };

    if scheme != "s3://" {
        return Err(format!("location template scheme is {}", scheme));
    }
    if ref_target(bucket) != Some(delivery_bucket) {
        return Err(format!(
            "catalog reads {} but the stream writes {}",
            bucket, delivery_bucket
        ));
    }
    let template_prefix = path
        .as_str()
        .and_then(LogPathLayout::template_key_prefix)
        .ok_or("location template does not end with ${date}")?;

    if delivery_prefix != template_prefix {
        return Err(format!(
            "delivery prefix '{}' != catalog prefix '{}'",
            delivery_prefix, template_prefix
        ));
    }
    if delivery_prefix != layout.delivery_prefix() {
        return Err(format!(
            "prefix '{}' differs from layout '{}'",
            delivery_prefix,
            layout.delivery_prefix()
        ));
    }

    Ok(format!("both use '{}'", delivery_prefix))
}

/// Hours spread over a day, so a partition that only matches midnight
/// keys is caught
const SAMPLE_HOURS: [u32; 3] = [0, 13, 23];

fn partition_layout_matches_delivery(stack: &Stack, layout: &LogPathLayout) -> Outcome {
    let table = stack
        .resources_of_type("AWS::Glue::Table")
        .into_iter()
        .next()
        .ok_or("no catalog table")?;
    let format = table
        .property_at(&["TableInput", "Parameters", "projection.date.format"])
        .and_then(Value::as_str)
        .ok_or("catalog table has no projection format")?;

    if format != layout.date_pattern() {
        return Err(format!(
            "projection format '{}' differs from layout '{}'",
            format,
            layout.date_pattern()
        ));
    }

    for hour in SAMPLE_HOURS {
        let at = Utc
            .with_ymd_and_hms(2024, 5, 1, hour, 30, 0)
            .single()
            .ok_or("invalid sample time")?;
        let delivered = layout.delivered_object_prefix(at);
        let partition = layout.partition_path(at.date_naive());
        if !delivered.starts_with(&partition) {
            return Err(format!(
                "objects land under '{}' but the partition reads '{}'",
                delivered, partition
            ));
        }
    }

    Ok(format!("'{}' partitions delivered keys", format))
}

fn task_policy_targets(stack: &Stack, naming: &Naming) -> Outcome {
    let policy = stack
        .resource("PolicyForFirelens")
        .ok_or("task policy is missing")?;
    let statements = policy
        .property_at(&["PolicyDocument", "Statement"])
        .and_then(Value::as_array)
        .ok_or("task policy has no statements")?;

    let app_log = stack
        .resources_of_type("AWS::Logs::LogGroup")
        .into_iter()
        .find(|r| physical_name(r) == Some(naming.app_log_group().as_str()))
        .ok_or("application log group is missing")?;
    let stream = stack
        .resources_of_type("AWS::KinesisFirehose::DeliveryStream")
        .into_iter()
        .next()
        .ok_or("no delivery stream")?;

    let mut targets = BTreeSet::new();
    for statement in statements {
        let resources = statement
            .get("Resource")
            .and_then(Value::as_array)
            .ok_or("statement without resources")?;
        for resource in resources {
            let target = get_att_arn_target(resource)
                .ok_or_else(|| format!("{} is not a resource reference", resource))?;
            targets.insert(target);
        }
    }

    let expected = BTreeSet::from([app_log.logical_id.as_str(), stream.logical_id.as_str()]);
    if targets != expected {
        return Err(format!("policy targets {:?}, expected {:?}", targets, expected));
    }

    let actions: BTreeSet<&str> = statements
        .iter()
        .filter_map(|s| s.get("Action").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    let expected_actions: BTreeSet<&str> = container::APP_LOG_ACTIONS
        .into_iter()
        .chain(container::DELIVERY_ACTIONS)
        .collect();
    if actions != expected_actions {
        return Err(format!("unexpected actions {:?}", actions));
    }

    Ok(format!(
        "{} and {}",
        app_log.logical_id, stream.logical_id
    ))
}

fn creation_order(stack: &Stack) -> Outcome {
    let order = stack.creation_order().map_err(|e| e.to_string())?;
    let in_construct = |resource: &Resource, construct: &str| {
        resource
            .construct_path
            .starts_with(&format!("{}/", construct))
    };

    let last_log_infra = order
        .iter()
        .rposition(|r| in_construct(*r, log_infra::CONSTRUCT_ID))
        .ok_or("no LogInfra resources")?;
    let first_consumer = order
        .iter()
        .position(|r| {
            in_construct(*r, container::CONSTRUCT_ID) || in_construct(*r, data_infra::CONSTRUCT_ID)
        })
        .ok_or("no Container or DataInfra resources")?;

    if last_log_infra > first_consumer {
        return Err(format!(
            "{} is created before {}",
            order[first_consumer].logical_id, order[last_log_infra].logical_id
        ));
    }
    Ok(format!("{} resources in order", order.len()))
}

fn catalog_names(stack: &Stack, naming: &Naming) -> Outcome {
    let names_of = |resource_type: &str| -> Vec<&str> {
        stack
            .resources_of_type(resource_type)
            .into_iter()
            .filter_map(physical_name)
            .collect()
    };

    let buckets = names_of("AWS::S3::Bucket");
    let unique: BTreeSet<&&str> = buckets.iter().collect();
    if unique.len() != buckets.len() {
        return Err(format!("bucket names repeat: {:?}", buckets));
    }
    for expected in [naming.log_bucket(), naming.query_result_bucket()] {
        if !buckets.contains(&expected.as_str()) {
            return Err(format!("bucket '{}' is missing", expected));
        }
    }
    if names_of("AWS::Glue::Database") != [naming.database().as_str()] {
        return Err(format!("database is not '{}'", naming.database()));
    }
    if names_of("AWS::Glue::Table") != [naming.table().as_str()] {
        return Err(format!("table is not '{}'", naming.table()));
    }

    Ok(format!("{} / {}", naming.database(), naming.table()))
}

fn teardown_policy(stack: &Stack) -> Outcome {
    let mut buckets = Vec::new();
    for resource in stack.resources() {
        let is_bucket = resource.resource_type == "AWS::S3::Bucket";
        if !is_bucket && resource.resource_type != "AWS::Logs::LogGroup" {
            continue;
        }
        if resource.removal_policy != Some(RemovalPolicy::Destroy) {
            return Err(format!(
                "{} is not destroyed with the stack",
                resource.logical_id
            ));
        }
        if is_bucket {
            buckets.push(resource.logical_id.clone());
        }
    }

    let all: Vec<&Resource> = stack.resources().iter().collect();
    let emptied = emptied_buckets(&all);
    if let Some(missing) = buckets.iter().find(|b| !emptied.contains(b)) {
        return Err(format!("{} is not emptied on teardown", missing));
    }

    Ok(format!("{} buckets emptied and destroyed", buckets.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::FirelensStack;
    use firelens_core::Deployment;

    #[test]
    fn test_all_checks_pass() {
        let built = FirelensStack::build(&Deployment::for_prefix("acme").unwrap()).unwrap();
        let results = built.check();
        assert_eq!(results.len(), 7);
        for result in &results {
            assert!(result.passed, "{} failed: {}", result.name, result.detail);
        }
        assert!(ensure_passed(&results).is_ok());
    }

    #[test]
    fn test_projection_format_drift_is_reported() {
        use crate::data_infra::DataInfra;
        use crate::env::AwsEnv;
        use crate::log_infra::LogInfra;
        use firelens_core::{CatalogSettings, DeliverySettings, Prefix};

        let naming = Naming::new(Prefix::new("acme").unwrap(), None);
        let env = AwsEnv::new(None, None);
        let layout = LogPathLayout::default();
        let monthly = LogPathLayout::new(crate::layout::DEFAULT_BASE, "yyyy/MM").unwrap();

        let mut stack = Stack::new("acme-FirelensStack");
        let logs = stack
            .compose(LogInfra {
                naming: &naming,
                env: &env,
                layout: &layout,
                delivery: &DeliverySettings::default(),
            })
            .unwrap();
        stack
            .compose(DataInfra {
                naming: &naming,
                env: &env,
                layout: &monthly,
                catalog: &CatalogSettings::default(),
                log_bucket: &logs.log_bucket,
            })
            .unwrap();

        let err = partition_layout_matches_delivery(&stack, &layout).unwrap_err();
        assert!(err.contains("yyyy/MM"));

        let results = run(&stack, &naming, &layout);
        let failed = results
            .iter()
            .find(|r| r.name == "partition-layout-matches-delivery")
            .unwrap();
        assert!(!failed.passed);
        assert!(ensure_passed(&results).is_err());
    }

    #[test]
    fn test_retained_bucket_is_reported() {
        let mut stack = Stack::new("test");
        stack
            .add_resource(
                Resource::new("LogBucket", "AWS::S3::Bucket")
                    .removal_policy(RemovalPolicy::Retain),
            )
            .unwrap();

        let outcome = teardown_policy(&stack);
        assert!(outcome.unwrap_err().contains("LogBucket"));
    }

    #[test]
    fn test_name_collision_is_reported() {
        let naming = Naming::new(firelens_core::Prefix::new("acme").unwrap(), None);
        let mut stack = Stack::new("test");
        stack
            .add_resource(
                Resource::new("FlaskLog", "AWS::Logs::LogGroup")
                    .property("LogGroupName", serde_json::json!("acme-flask-log")),
            )
            .unwrap();
        stack
            .add_resource(Resource::new("GlueTable", "AWS::Glue::Table").property(
                "TableInput",
                serde_json::json!({ "Name": "acme-flask-log" }),
            ))
            .unwrap();

        let err = names_prefixed_and_unique(&stack, &naming).unwrap_err();
        assert!(err.contains("FlaskLog") && err.contains("GlueTable"));
    }

    #[test]
    fn test_ensure_passed_reports_first_failure() {
        let results = vec![
            CheckResult {
                name: "a",
                passed: true,
                detail: String::new(),
            },
            CheckResult {
                name: "b",
                passed: false,
                detail: "broken".to_string(),
            },
        ];
        let err = ensure_passed(&results).unwrap_err();
        assert!(err.to_string().contains("b: broken"));
    }
}
