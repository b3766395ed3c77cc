//! Log delivery infrastructure
//!
//! Log bucket, delivery stream writing into it, the stream's role, and the
//! log group the stream reports delivery failures to.

use crate::env::AwsEnv;
use crate::error::{AwsError, Result};
use crate::iam::{PolicyDocument, PolicyStatement, service_trust};
use crate::layout::LogPathLayout;
use crate::logs::{RetentionDays, log_group};
use crate::naming::Naming;
use crate::s3::{ProviderNames, add_auto_emptied_bucket};
use firelens_cloud::{Construct, RemovalPolicy, Resource, ResourceRef, Scope, token};
use firelens_core::DeliverySettings;
use serde_json::{Value, json};

pub const CONSTRUCT_ID: &str = "LogInfra";

/// Stream the failure log group receives delivery errors on
pub const FAIL_LOG_STREAM: &str = "logs";
pub const ERROR_OUTPUT_PREFIX: &str = "errorOutput";

const BUFFER_INTERVAL_RANGE: std::ops::RangeInclusive<u32> = 60..=900;
const BUFFER_SIZE_RANGE: std::ops::RangeInclusive<u32> = 1..=128;

/// Handle to the log bucket
///
/// Only [`LogInfra`] hands these out, so anything that needs the bucket has
/// to be composed after it.
#[derive(Debug, Clone)]
pub struct LogBucketRef {
    inner: ResourceRef,
}

impl LogBucketRef {
    pub fn resource(&self) -> &ResourceRef {
        &self.inner
    }

    pub fn bucket_name(&self) -> Value {
        self.inner.to_ref()
    }

    pub fn arn(&self) -> Value {
        self.inner.arn()
    }
}

/// Handle to the delivery stream
#[derive(Debug, Clone)]
pub struct DeliveryStreamRef {
    inner: ResourceRef,
}

impl DeliveryStreamRef {
    pub fn resource(&self) -> &ResourceRef {
        &self.inner
    }

    pub fn stream_name(&self) -> Value {
        self.inner.to_ref()
    }

    pub fn arn(&self) -> Value {
        self.inner.arn()
    }
}

#[derive(Debug, Clone)]
pub struct LogInfraOutput {
    pub log_bucket: LogBucketRef,
    pub delivery_stream: DeliveryStreamRef,
}

pub struct LogInfra<'a> {
    pub naming: &'a Naming,
    pub env: &'a AwsEnv,
    pub layout: &'a LogPathLayout,
    pub delivery: &'a DeliverySettings,
}

impl LogInfra<'_> {
    fn validate(&self) -> Result<()> {
        let d = self.delivery;
        if !BUFFER_INTERVAL_RANGE.contains(&d.buffer_interval_secs) {
            return Err(AwsError::InvalidSetting(format!(
                "delivery buffer interval must be {}-{} seconds: {}",
                BUFFER_INTERVAL_RANGE.start(),
                BUFFER_INTERVAL_RANGE.end(),
                d.buffer_interval_secs
            )));
        }
        if !BUFFER_SIZE_RANGE.contains(&d.buffer_size_mb) {
            return Err(AwsError::InvalidSetting(format!(
                "delivery buffer size must be {}-{} MB: {}",
                BUFFER_SIZE_RANGE.start(),
                BUFFER_SIZE_RANGE.end(),
                d.buffer_size_mb
            )));
        }
        Ok(())
    }
}

impl Construct for LogInfra<'_> {
    type Output = LogInfraOutput;
    type Error = AwsError;

    fn id(&self) -> &str {
        CONSTRUCT_ID
    }

    fn build(self, scope: &mut Scope<'_>) -> Result<LogInfraOutput> {
        self.validate()?;
        let naming = self.naming;

        let bucket = add_auto_emptied_bucket(
            scope,
            "LogBucket",
            &naming.log_bucket(),
            &ProviderNames {
                function: naming.auto_delete_function(),
                role: naming.auto_delete_role(),
            },
        )?;

        let fail_log_group = scope.add(log_group(
            "DeliveryStreamFailLogGroup",
            &naming.delivery_fail_log_group(),
            RetentionDays::TWO_YEARS,
        ))?;

        let fail_log_stream = scope.add(
            Resource::new("DeliveryStreamLogStream", "AWS::Logs::LogStream")
                .property("LogGroupName", fail_log_group.to_ref())
                .property("LogStreamName", json!(FAIL_LOG_STREAM))
                .removal_policy(RemovalPolicy::Destroy),
        )?;

        let role = scope.add(
            Resource::new("DeliveryStreamRole", "AWS::IAM::Role")
                .property("RoleName", json!(naming.delivery_role()))
                .property(
                    "AssumeRolePolicyDocument",
                    service_trust("firehose.amazonaws.com"),
                ),
        )?;

        let role_policy = scope.add(
            Resource::new("DeliveryStreamRoleDefaultPolicy", "AWS::IAM::Policy")
                .property("PolicyName", json!("DeliveryStreamRoleDefaultPolicy"))
                .property("Roles", json!([role.to_ref()]))
                .property(
                    "PolicyDocument",
                    delivery_policy(self.env, &bucket).to_value(),
                ),
        )?;

        let stream = scope.add(
            Resource::new("FirehoseStream", "AWS::KinesisFirehose::DeliveryStream")
                .property("DeliveryStreamName", json!(naming.delivery_stream()))
                .property("DeliveryStreamType", json!("DirectPut"))
                .property(
                    "S3DestinationConfiguration",
                    json!({
                        "BucketARN": bucket.arn(),
                        "Prefix": self.layout.delivery_prefix(),
                        "RoleARN": role.arn(),
                        "BufferingHints": {
                            "IntervalInSeconds": self.delivery.buffer_interval_secs,
                            "SizeInMBs": self.delivery.buffer_size_mb
                        },
                        "CompressionFormat": "GZIP",
                        "ErrorOutputPrefix": ERROR_OUTPUT_PREFIX,
                        "CloudWatchLoggingOptions": {
                            "Enabled": true,
                            "LogGroupName": fail_log_group.to_ref(),
                            "LogStreamName": fail_log_stream.to_ref()
                        }
                    }),
                )
                // The role needs its permissions before the stream is created
                .depends_on(&role_policy),
        )?;

        Ok(LogInfraOutput {
            log_bucket: LogBucketRef { inner: bucket },
            delivery_stream: DeliveryStreamRef { inner: stream },
        })
    }
}

/// The delivery role's three statements: read streams, write the bucket,
/// write the failure log
fn delivery_policy(env: &AwsEnv, bucket: &ResourceRef) -> PolicyDocument {
    PolicyDocument::new(vec![
        PolicyStatement::allow(
            [
                "kinesis:DescribeStream",
                "kinesis:GetShardIterator",
                "kinesis:GetRecords",
            ],
            vec![env.arn("kinesis", "stream/*")],
        ),
        PolicyStatement::allow(
            [
                "s3:AbortMultipartUpload",
                "s3:GetBucketLocation",
                "s3:GetObject",
                "s3:ListBucket",
                "s3:ListBucketMultipartUploads",
                "s3:PutObject",
            ],
            vec![bucket.arn(), token::join("", vec![bucket.arn(), json!("/*")])],
        ),
        PolicyStatement::allow(
            ["logs:PutLogEvents"],
            vec![env.arn("logs", "log-group:/aws/kinesisfirehose/*")],
        ),
    ])
}
