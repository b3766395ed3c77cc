//! Query layer over the delivered logs
//!
//! A Glue table with date partition projection over the log bucket, and an
//! Athena workgroup writing its results to a dedicated bucket.

use crate::env::AwsEnv;
use crate::error::{AwsError, Result};
use crate::layout::LogPathLayout;
use crate::log_infra::LogBucketRef;
use crate::naming::Naming;
use crate::s3::{ProviderNames, add_auto_emptied_bucket};
use firelens_cloud::{Construct, Resource, ResourceRef, Scope, token};
use firelens_core::CatalogSettings;
use serde_json::{Map, Value, json};

pub const CONSTRUCT_ID: &str = "DataInfra";

pub const ENGINE_VERSION: &str = "Athena engine version 3";
pub const RESULT_PREFIX: &str = "result-data";
pub const PARTITION_KEY: &str = "date";

/// Fields the router emits for each record, with ECS metadata enabled
pub const LOG_COLUMNS: [&str; 8] = [
    "container_id",
    "container_name",
    "ecs_cluster",
    "ecs_task_arn",
    "ecs_task_definition",
    "log",
    "source",
    "time",
];

const INPUT_FORMAT: &str = "org.apache.hadoop.mapred.TextInputFormat";
const OUTPUT_FORMAT: &str = "org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat";
const SERDE: &str = "org.openx.data.jsonserde.JsonSerDe";

#[derive(Debug, Clone)]
pub struct DataInfraOutput {
    pub query_result_bucket: ResourceRef,
    pub work_group: ResourceRef,
    pub database: ResourceRef,
    pub table: ResourceRef,
}

pub struct DataInfra<'a> {
    pub naming: &'a Naming,
    pub env: &'a AwsEnv,
    pub layout: &'a LogPathLayout,
    pub catalog: &'a CatalogSettings,
    pub log_bucket: &'a LogBucketRef,
}

impl DataInfra<'_> {
    fn table_parameters(&self) -> Value {
        let layout = self.layout;
        let mut parameters = Map::new();
        parameters.insert("projection.enabled".into(), json!("true"));
        parameters.insert("projection.date.type".into(), json!("date"));
        parameters.insert(
            "projection.date.range".into(),
            json!(layout.projection_range(
                self.catalog.projection_start,
                self.catalog.projection_offset_hours
            )),
        );
        parameters.insert("projection.date.format".into(), json!(layout.date_pattern()));
        parameters.insert("projection.date.interval".into(), json!("1"));
        parameters.insert("projection.date.interval.unit".into(), json!("DAYS"));
        parameters.insert("serialization.encoding".into(), json!("utf-8"));
        parameters.insert(
            "storage.location.template".into(),
            layout.location_template(self.log_bucket.bucket_name()),
        );
        Value::Object(parameters)
    }
}

impl Construct for DataInfra<'_> {
    type Output = DataInfraOutput;
    type Error = AwsError;

    fn id(&self) -> &str {
        CONSTRUCT_ID
    }

    fn build(self, scope: &mut Scope<'_>) -> Result<DataInfraOutput> {
        let naming = self.naming;

        let query_result_bucket = add_auto_emptied_bucket(
            scope,
            "AthenaQueryResultBucket",
            &naming.query_result_bucket(),
            &ProviderNames {
                function: naming.auto_delete_function(),
                role: naming.auto_delete_role(),
            },
        )?;

        let work_group = scope.add(
            Resource::new("AthenaWorkGroup", "AWS::Athena::WorkGroup")
                .property("Name", json!(naming.work_group()))
                .property(
                    "WorkGroupConfiguration",
                    json!({
                        "EngineVersion": { "SelectedEngineVersion": ENGINE_VERSION },
                        "ResultConfiguration": {
                            "OutputLocation": token::join("", vec![
                                json!("s3://"),
                                query_result_bucket.to_ref(),
                                json!(format!("/{}", RESULT_PREFIX)),
                            ])
                        }
                    }),
                )
                .property("RecursiveDeleteOption", json!(true)),
        )?;

        let database = scope.add(
            Resource::new("GlueDatabase", "AWS::Glue::Database")
                .property("CatalogId", self.env.account_id())
                .property("DatabaseInput", json!({ "Name": naming.database() })),
        )?;

        let columns: Vec<Value> = LOG_COLUMNS
            .iter()
            .map(|name| json!({ "Name": name, "Type": "string" }))
            .collect();

        let table = scope.add(
            Resource::new("GlueTable", "AWS::Glue::Table")
                // Ref yields the database name and orders the table after it
                .property("DatabaseName", database.to_ref())
                .property("CatalogId", self.env.account_id())
                .property(
                    "TableInput",
                    json!({
                        "Name": naming.table(),
                        "TableType": "EXTERNAL_TABLE",
                        "Parameters": self.table_parameters(),
                        "StorageDescriptor": {
                            "Columns": columns,
                            "InputFormat": INPUT_FORMAT,
                            "OutputFormat": OUTPUT_FORMAT,
                            "SerdeInfo": { "SerializationLibrary": SERDE },
                            "Location": self.layout.location(self.log_bucket.bucket_name())
                        },
                        "PartitionKeys": [{ "Name": PARTITION_KEY, "Type": "string" }]
                    }),
                ),
        )?;

        Ok(DataInfraOutput {
            query_result_bucket,
            work_group,
            database,
            table,
        })
    }
}
