//! AWS components of the FireLens log pipeline
//!
//! Three components composed in dependency order into one stack:
//!
//! - [`LogInfra`]: log bucket, delivery stream, its role and failure log
//! - [`Container`]: load-balanced Fargate service with a FireLens router
//!   sidecar shipping to the delivery stream
//! - [`DataInfra`]: Glue catalog table over the log bucket and an Athena
//!   workgroup
//!
//! # Example
//!
//! ```ignore
//! use firelens_cloud::{Template, TemplateFormat};
//! use firelens_cloud_aws::FirelensStack;
//! use firelens_core::Deployment;
//!
//! let deployment = Deployment::for_prefix("acme")?;
//! let built = FirelensStack::build(&deployment)?;
//! let template = Template::synthesize(built.stack())?;
//! println!("{}", template.render(TemplateFormat::Yaml)?);
//! ```

pub mod checks;
pub mod container;
pub mod data_infra;
pub mod env;
pub mod error;
pub mod iam;
pub mod layout;
pub mod log_infra;
pub mod logs;
pub mod naming;
pub mod s3;
pub mod stack;

pub use checks::{CheckResult, ensure_passed};
pub use container::{Container, ContainerOutput};
pub use data_infra::{DataInfra, DataInfraOutput};
pub use env::AwsEnv;
pub use error::{AwsError, Result};
pub use layout::LogPathLayout;
pub use log_infra::{DeliveryStreamRef, LogBucketRef, LogInfra, LogInfraOutput};
pub use logs::RetentionDays;
pub use naming::Naming;
pub use stack::FirelensStack;
