//! Top-level composition

use crate::checks::{self, CheckResult};
use crate::container::Container;
use crate::data_infra::DataInfra;
use crate::env::AwsEnv;
use crate::error::Result;
use crate::layout::LogPathLayout;
use crate::log_infra::LogInfra;
use crate::naming::Naming;
use firelens_cloud::{Output, Stack, token};
use firelens_core::Deployment;
use serde_json::json;
use tracing::info;

/// The composed FireLens stack of one deployment
#[derive(Debug)]
pub struct FirelensStack {
    stack: Stack,
    naming: Naming,
    layout: LogPathLayout,
}

impl FirelensStack {
    /// Compose LogInfra, then Container, then DataInfra
    ///
    /// The order is forced by the inputs: the delivery stream and log bucket
    /// handles only exist once LogInfra has been composed.
    pub fn build(deployment: &Deployment) -> Result<Self> {
        let naming = Naming::from_deployment(deployment);
        let env = AwsEnv::from_deployment(deployment);
        let layout = LogPathLayout::default();

        let mut stack = Stack::new(&deployment.stack_name).with_description(format!(
            "FireLens log pipeline ({})",
            deployment.prefix
        ));

        let logs = stack.compose(LogInfra {
            naming: &naming,
            env: &env,
            layout: &layout,
            delivery: &deployment.delivery,
        })?;

        let container = stack.compose(Container {
            naming: &naming,
            env: &env,
            app: &deployment.app,
            router: &deployment.router,
            network: deployment.network.as_ref(),
            delivery_stream: &logs.delivery_stream,
        })?;

        let data = stack.compose(DataInfra {
            naming: &naming,
            env: &env,
            layout: &layout,
            catalog: &deployment.catalog,
            log_bucket: &logs.log_bucket,
        })?;

        stack.add_output(
            "LogBucketName",
            Output::new(logs.log_bucket.bucket_name())
                .with_description("Bucket the delivery stream writes to"),
        )?;
        stack.add_output(
            "FirehoseStreamName",
            Output::new(logs.delivery_stream.stream_name()),
        )?;
        stack.add_output(
            "LoadBalancerDNS",
            Output::new(container.load_balancer.get_att("DNSName")),
        )?;
        stack.add_output(
            "ServiceURL",
            Output::new(token::join(
                "",
                vec![json!("http://"), container.load_balancer.get_att("DNSName")],
            )),
        )?;
        stack.add_output(
            "AthenaWorkGroupName",
            Output::new(data.work_group.to_ref()),
        )?;

        info!(
            stack = %stack.name(),
            resources = stack.resources().len(),
            "Composed FireLens stack"
        );

        Ok(Self {
            stack,
            naming,
            layout,
        })
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    pub fn layout(&self) -> &LogPathLayout {
        &self.layout
    }

    /// Run the composition checks against the built graph
    pub fn check(&self) -> Vec<CheckResult> {
        checks::run(&self.stack, &self.naming, &self.layout)
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }
}
