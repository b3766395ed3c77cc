//! Private buckets that are emptied and deleted with the stack
//!
//! CloudFormation cannot delete a bucket that still holds objects, so every
//! bucket gets a custom resource backed by one inline Lambda per stack that
//! deletes all object versions when the resource is deleted.

use crate::error::Result;
use crate::iam::{PolicyDocument, PolicyStatement, service_trust};
use crate::logs::{RetentionDays, log_group};
use firelens_cloud::{RemovalPolicy, Resource, ResourceRef, Scope, token};
use serde_json::{Value, json};

pub const AUTO_DELETE_RESOURCE_TYPE: &str = "Custom::S3AutoDeleteObjects";
pub const AUTO_DELETE_TAG: &str = "firelens:auto-delete-objects";

const PROVIDER_ROLE_ID: &str = "AutoDeleteObjectsProviderRole";
const PROVIDER_FUNCTION_ID: &str = "AutoDeleteObjectsProviderFunction";
const PROVIDER_LOG_GROUP_ID: &str = "AutoDeleteObjectsProviderLogGroup";

const PROVIDER_HANDLER: &str = r#"const response = require('cfn-response');
const { S3Client, ListObjectVersionsCommand, DeleteObjectsCommand } = require('@aws-sdk/client-s3');

const s3 = new S3Client({});

async function emptyBucket(bucket) {
  let marker = {};
  while (marker) {
    const page = await s3.send(new ListObjectVersionsCommand({ Bucket: bucket, ...marker }));
    const objects = [...(page.Versions || []), ...(page.DeleteMarkers || [])]
      .map(({ Key, VersionId }) => ({ Key, VersionId }));
    if (objects.length > 0) {
      await s3.send(new DeleteObjectsCommand({ Bucket: bucket, Delete: { Objects: objects } }));
    }
    marker = page.IsTruncated
      ? { KeyMarker: page.NextKeyMarker, VersionIdMarker: page.NextVersionIdMarker }
      : null;
  }
}

exports.handler = async (event, context) => {
  try {
    if (event.RequestType === 'Delete') {
      await emptyBucket(event.ResourceProperties.BucketName);
    }
    await response.send(event, context, response.SUCCESS, {});
  } catch (err) {
    if (err.name === 'NoSuchBucket') {
      await response.send(event, context, response.SUCCESS, {});
      return;
    }
    console.error(err);
    await response.send(event, context, response.FAILED, {});
  }
};
"#;

/// Private, encrypted, public-access-blocked bucket destroyed with the stack
pub fn secure_bucket(logical_id: &str, name: &str) -> Resource {
    Resource::new(logical_id, "AWS::S3::Bucket")
        .property("BucketName", json!(name))
        .property("AccessControl", json!("Private"))
        .property(
            "BucketEncryption",
            json!({
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" }
                }]
            }),
        )
        .property(
            "PublicAccessBlockConfiguration",
            json!({
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true
            }),
        )
        .property(
            "Tags",
            json!([{ "Key": AUTO_DELETE_TAG, "Value": "true" }]),
        )
        .removal_policy(RemovalPolicy::Destroy)
}

/// Add a secure bucket plus the resources that empty it on teardown
pub fn add_auto_emptied_bucket(
    scope: &mut Scope<'_>,
    logical_id: &str,
    name: &str,
    provider_names: &ProviderNames,
) -> Result<ResourceRef> {
    let bucket = scope.add(secure_bucket(logical_id, name))?;
    let provider = ensure_provider(scope, provider_names)?;

    let bucket_arn = bucket.arn();
    let objects_arn = token::join("", vec![bucket.arn(), json!("/*")]);
    let policy_document = PolicyDocument::new(vec![
        PolicyStatement::allow(
            [
                "s3:PutBucketPolicy",
                "s3:GetBucket*",
                "s3:List*",
                "s3:DeleteObject*",
            ],
            vec![bucket_arn, objects_arn],
        )
        .with_principal(json!({ "AWS": provider.role.arn() })),
    ]);

    let policy = scope.add(
        Resource::new(format!("{}Policy", logical_id), "AWS::S3::BucketPolicy")
            .property("Bucket", bucket.to_ref())
            .property("PolicyDocument", policy_document.to_value()),
    )?;

    scope.add(
        Resource::new(
            format!("{}AutoDeleteObjectsCustomResource", logical_id),
            AUTO_DELETE_RESOURCE_TYPE,
        )
        .property("ServiceToken", provider.function.arn())
        .property("BucketName", bucket.to_ref())
        .depends_on(&policy)
        .removal_policy(RemovalPolicy::Destroy),
    )?;

    tracing::debug!(bucket = %logical_id, "Bucket will be emptied on teardown");
    Ok(bucket)
}

/// Physical names of the shared provider
#[derive(Debug, Clone)]
pub struct ProviderNames {
    pub function: String,
    pub role: String,
}

struct Provider {
    role: ResourceRef,
    function: ResourceRef,
}

/// The provider is shared by every bucket of the stack; the first bucket
/// declares it
fn ensure_provider(scope: &mut Scope<'_>, names: &ProviderNames) -> Result<Provider> {
    if let (Some(role), Some(function)) =
        (scope.find(PROVIDER_ROLE_ID), scope.find(PROVIDER_FUNCTION_ID))
    {
        return Ok(Provider { role, function });
    }

    let role = scope.add(
        Resource::new(PROVIDER_ROLE_ID, "AWS::IAM::Role")
            .property("RoleName", json!(names.role))
            .property(
                "AssumeRolePolicyDocument",
                service_trust("lambda.amazonaws.com"),
            )
            .property(
                "ManagedPolicyArns",
                json!([token::sub(
                    "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
                )]),
            ),
    )?;

    // Declared up front, otherwise Lambda creates it and it outlives the stack
    let provider_log = scope.add(log_group(
        PROVIDER_LOG_GROUP_ID,
        &format!("/aws/lambda/{}", names.function),
        RetentionDays::ONE_WEEK,
    ))?;

    let function = scope.add(
        Resource::new(PROVIDER_FUNCTION_ID, "AWS::Lambda::Function")
            .property("FunctionName", json!(names.function))
            .property("Runtime", json!("nodejs20.x"))
            .property("Handler", json!("index.handler"))
            .property("Timeout", json!(900))
            .property("MemorySize", json!(128))
            .property("Role", role.arn())
            .property("Code", json!({ "ZipFile": PROVIDER_HANDLER }))
            .property(
                "Description",
                json!("Deletes all objects of a bucket when its custom resource is deleted"),
            )
            .depends_on(&role)
            .depends_on(&provider_log),
    )?;

    Ok(Provider { role, function })
}

/// Logical ids of the buckets an auto-delete custom resource empties
pub fn emptied_buckets(resources: &[&Resource]) -> Vec<String> {
    resources
        .iter()
        .filter(|r| r.resource_type == AUTO_DELETE_RESOURCE_TYPE)
        .filter_map(|r| r.get_property("BucketName"))
        .filter_map(|v| v.get("Ref").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}
