//! Load-balanced container service with a FireLens log router
//!
//! The application container hands its stdout to the router sidecar
//! (`awsfirelens` driver). The router ships application logs to the
//! delivery stream and error logs to the application log group, whose names
//! it reads from its environment.

use crate::env::AwsEnv;
use crate::error::{AwsError, Result};
use crate::iam::{PolicyDocument, PolicyStatement, service_trust};
use crate::log_infra::DeliveryStreamRef;
use crate::logs::{RetentionDays, log_group};
use crate::naming::Naming;
use firelens_cloud::{Construct, Parameter, Resource, ResourceRef, Scope};
use firelens_core::{AppSettings, HealthCheckSettings, NetworkSettings, RouterSettings};
use serde_json::{Value, json};
use std::ops::RangeInclusive;

pub const CONSTRUCT_ID: &str = "Container";

pub const APP_CONTAINER: &str = "web";
pub const ROUTER_CONTAINER: &str = "log_router";
pub const ROUTER_STREAM_PREFIX: &str = "firelens";
pub const LISTENER_PORT: u16 = 80;

/// Actions the task role needs on the application log group
pub const APP_LOG_ACTIONS: [&str; 5] = [
    "logs:CreateLogStream",
    "logs:CreateLogGroup",
    "logs:DescribeLogStreams",
    "logs:PutLogEvents",
    "logs:PutRetentionPolicy",
];
pub const DELIVERY_ACTIONS: [&str; 1] = ["firehose:PutRecordBatch"];

const HEALTH_INTERVAL: RangeInclusive<u32> = 5..=300;
const HEALTH_TIMEOUT: RangeInclusive<u32> = 2..=120;
const HEALTH_RETRIES: RangeInclusive<u32> = 1..=10;
const HEALTH_START_PERIOD: RangeInclusive<u32> = 0..=300;

#[derive(Debug, Clone)]
pub struct ContainerOutput {
    pub service: ResourceRef,
    pub load_balancer: ResourceRef,
    pub app_log_group: ResourceRef,
    pub task_policy: ResourceRef,
}

pub struct Container<'a> {
    pub naming: &'a Naming,
    pub env: &'a AwsEnv,
    pub app: &'a AppSettings,
    pub router: &'a RouterSettings,
    pub network: Option<&'a NetworkSettings>,
    pub delivery_stream: &'a DeliveryStreamRef,
}

/// VPC wiring: fixed ids, or template parameters
struct Network {
    vpc_id: Value,
    subnets: Value,
    assign_public_ip: bool,
}

impl Container<'_> {
    fn network(&self, scope: &mut Scope<'_>) -> Result<Network> {
        match self.network {
            Some(network) => Ok(Network {
                vpc_id: json!(network.vpc_id),
                subnets: json!(network.subnet_ids),
                assign_public_ip: network.assign_public_ip,
            }),
            None => {
                let vpc_id = scope.parameter(
                    "VpcId",
                    Parameter::new("AWS::EC2::VPC::Id")
                        .with_description("VPC the service and load balancer run in"),
                )?;
                let subnets = scope.parameter(
                    "SubnetIds",
                    Parameter::new("List<AWS::EC2::Subnet::Id>")
                        .with_description("Public subnets for the load balancer and tasks"),
                )?;
                Ok(Network {
                    vpc_id,
                    subnets,
                    assign_public_ip: true,
                })
            }
        }
    }

    fn router_container(&self, router_log: &ResourceRef, app_log: &ResourceRef) -> Value {
        let router = self.router;
        let health = &router.health_check;
        json!({
            "Name": ROUTER_CONTAINER,
            "Image": self.env.ecr_image(&router.repository, &router.tag),
            "Essential": true,
            "User": "0",
            "MemoryReservation": 50,
            "FirelensConfiguration": {
                "Type": "fluentbit",
                "Options": {
                    "config-file-type": "file",
                    "config-file-value": router.config_file,
                    "enable-ecs-log-metadata": "true"
                }
            },
            "HealthCheck": {
                "Command": ["CMD-SHELL", router_health_command(router.health_port)],
                "Interval": health.interval_secs,
                "Retries": health.retries,
                "StartPeriod": health.start_period_secs,
                "Timeout": health.timeout_secs
            },
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": router_log.to_ref(),
                    "awslogs-stream-prefix": ROUTER_STREAM_PREFIX,
                    "awslogs-region": self.env.region()
                }
            },
            "Environment": [
                { "Name": "LOG_GROUP_NAME", "Value": app_log.to_ref() },
                { "Name": "FIREHOSE_STREAM_NAME", "Value": self.delivery_stream.stream_name() }
            ]
        })
    }

    fn app_container(&self) -> Value {
        let app = self.app;
        json!({
            "Name": APP_CONTAINER,
            "Image": self.env.ecr_image(&app.repository, &app.tag),
            "Essential": true,
            "PortMappings": [{ "ContainerPort": app.container_port, "Protocol": "tcp" }],
            "LogConfiguration": { "LogDriver": "awsfirelens" },
            "DependsOn": [{ "ContainerName": ROUTER_CONTAINER, "Condition": "START" }]
        })
    }

    fn execution_policy(&self, router_log: &ResourceRef) -> PolicyDocument {
        let repositories = [&self.app.repository, &self.router.repository]
            .into_iter()
            .map(|name| self.env.arn("ecr", &format!("repository/{}", name)))
            .collect();

        PolicyDocument::new(vec![
            PolicyStatement::allow(["ecr:GetAuthorizationToken"], vec![json!("*")]),
            PolicyStatement::allow(
                [
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:GetDownloadUrlForLayer",
                    "ecr:BatchGetImage",
                ],
                repositories,
            ),
            PolicyStatement::allow(
                ["logs:CreateLogStream", "logs:PutLogEvents"],
                vec![router_log.arn()],
            ),
        ])
    }
}

impl Construct for Container<'_> {
    type Output = ContainerOutput;
    type Error = AwsError;

    fn id(&self) -> &str {
        CONSTRUCT_ID
    }

    fn build(self, scope: &mut Scope<'_>) -> Result<ContainerOutput> {
        validate_health_check(&self.router.health_check)?;
        validate_task_size(self.app.cpu, self.app.memory_mib)?;
        if self.app.desired_count == 0 {
            return Err(AwsError::InvalidSetting(
                "desired count must be at least 1".to_string(),
            ));
        }
        let retention = RetentionDays::new(self.app.log_retention_days)?;
        let naming = self.naming;
        let network = self.network(scope)?;

        let app_log = scope.add(log_group("FlaskLog", &naming.app_log_group(), retention))?;
        let router_log = scope.add(log_group(
            "FirelensLog",
            &naming.router_log_group(),
            retention,
        ))?;

        let cluster = scope.add(
            Resource::new("Cluster", "AWS::ECS::Cluster")
                .property("ClusterName", json!(naming.cluster())),
        )?;

        let execution_role = scope.add(
            Resource::new("TaskExecutionRole", "AWS::IAM::Role")
                .property("RoleName", json!(naming.execution_role()))
                .property(
                    "AssumeRolePolicyDocument",
                    service_trust("ecs-tasks.amazonaws.com"),
                ),
        )?;
        let execution_policy = scope.add(
            Resource::new("TaskExecutionRoleDefaultPolicy", "AWS::IAM::Policy")
                .property("PolicyName", json!("TaskExecutionRoleDefaultPolicy"))
                .property("Roles", json!([execution_role.to_ref()]))
                .property(
                    "PolicyDocument",
                    self.execution_policy(&router_log).to_value(),
                ),
        )?;

        let task_role = scope.add(
            Resource::new("TaskRole", "AWS::IAM::Role")
                .property("RoleName", json!(naming.task_role()))
                .property(
                    "AssumeRolePolicyDocument",
                    service_trust("ecs-tasks.amazonaws.com"),
                ),
        )?;

        let task_definition = scope.add(
            Resource::new("TaskDefinition", "AWS::ECS::TaskDefinition")
                .property("Family", json!(naming.task_family()))
                .property("Cpu", json!(self.app.cpu.to_string()))
                .property("Memory", json!(self.app.memory_mib.to_string()))
                .property("NetworkMode", json!("awsvpc"))
                .property("RequiresCompatibilities", json!(["FARGATE"]))
                .property("ExecutionRoleArn", execution_role.arn())
                .property("TaskRoleArn", task_role.arn())
                .property(
                    "ContainerDefinitions",
                    json!([
                        self.app_container(),
                        self.router_container(&router_log, &app_log)
                    ]),
                )
                .depends_on(&execution_policy),
        )?;

        let lb_security_group = scope.add(
            Resource::new("LoadBalancerSecurityGroup", "AWS::EC2::SecurityGroup")
                .property(
                    "GroupDescription",
                    json!(format!("{} load balancer", naming.prefix())),
                )
                .property("VpcId", network.vpc_id.clone())
                .property(
                    "SecurityGroupIngress",
                    json!([{
                        "CidrIp": "0.0.0.0/0",
                        "IpProtocol": "tcp",
                        "FromPort": LISTENER_PORT,
                        "ToPort": LISTENER_PORT
                    }]),
                ),
        )?;

        let service_security_group = scope.add(
            Resource::new("ServiceSecurityGroup", "AWS::EC2::SecurityGroup")
                .property(
                    "GroupDescription",
                    json!(format!("{} service tasks", naming.prefix())),
                )
                .property("VpcId", network.vpc_id.clone())
                .property(
                    "SecurityGroupIngress",
                    json!([{
                        "SourceSecurityGroupId": lb_security_group.get_att("GroupId"),
                        "IpProtocol": "tcp",
                        "FromPort": self.app.container_port,
                        "ToPort": self.app.container_port
                    }]),
                ),
        )?;

        let load_balancer = scope.add(
            Resource::new(
                "LoadBalancer",
                "AWS::ElasticLoadBalancingV2::LoadBalancer",
            )
            .property("Name", json!(naming.load_balancer()))
            .property("Scheme", json!("internet-facing"))
            .property("Type", json!("application"))
            .property("Subnets", network.subnets.clone())
            .property(
                "SecurityGroups",
                json!([lb_security_group.get_att("GroupId")]),
            ),
        )?;

        let target_group = scope.add(
            Resource::new("TargetGroup", "AWS::ElasticLoadBalancingV2::TargetGroup")
                .property("Name", json!(naming.target_group()))
                .property("Port", json!(self.app.container_port))
                .property("Protocol", json!("HTTP"))
                .property("TargetType", json!("ip"))
                .property("VpcId", network.vpc_id.clone())
                .property("HealthCheckPath", json!(self.app.health_check_path)),
        )?;

        let listener = scope.add(
            Resource::new("Listener", "AWS::ElasticLoadBalancingV2::Listener")
                .property("LoadBalancerArn", load_balancer.to_ref())
                .property("Port", json!(LISTENER_PORT))
                .property("Protocol", json!("HTTP"))
                .property(
                    "DefaultActions",
                    json!([{ "Type": "forward", "TargetGroupArn": target_group.to_ref() }]),
                ),
        )?;

        let assign_public_ip = if network.assign_public_ip {
            "ENABLED"
        } else {
            "DISABLED"
        };
        let service = scope.add(
            Resource::new("Service", "AWS::ECS::Service")
                .property("ServiceName", json!(naming.service()))
                .property("Cluster", cluster.to_ref())
                .property("TaskDefinition", task_definition.to_ref())
                .property("DesiredCount", json!(self.app.desired_count))
                .property("LaunchType", json!("FARGATE"))
                .property("HealthCheckGracePeriodSeconds", json!(60))
                .property(
                    "NetworkConfiguration",
                    json!({
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": assign_public_ip,
                            "Subnets": network.subnets,
                            "SecurityGroups": [service_security_group.get_att("GroupId")]
                        }
                    }),
                )
                .property(
                    "LoadBalancers",
                    json!([{
                        "ContainerName": APP_CONTAINER,
                        "ContainerPort": self.app.container_port,
                        "TargetGroupArn": target_group.to_ref()
                    }]),
                )
                // The target group must be attached to the load balancer first
                .depends_on(&listener),
        )?;

        let task_policy = scope.add(
            Resource::new("PolicyForFirelens", "AWS::IAM::ManagedPolicy")
                .property("ManagedPolicyName", json!(naming.task_policy()))
                .property(
                    "Description",
                    json!("Allows ecs send logs to CWLogs and Firehose"),
                )
                .property(
                    "PolicyDocument",
                    task_policy_document(&app_log, self.delivery_stream).to_value(),
                )
                .property("Roles", json!([task_role.to_ref()])),
        )?;

        Ok(ContainerOutput {
            service,
            load_balancer,
            app_log_group: app_log,
            task_policy,
        })
    }
}

/// The task role may write the application log group and put records to
/// the delivery stream, and nothing else
pub fn task_policy_document(app_log: &ResourceRef, stream: &DeliveryStreamRef) -> PolicyDocument {
    PolicyDocument::new(vec![
        PolicyStatement::allow(APP_LOG_ACTIONS, vec![app_log.arn()]),
        PolicyStatement::allow(DELIVERY_ACTIONS, vec![stream.arn()]),
    ])
}

/// Probe of the router's TCP health input
pub fn router_health_command(port: u16) -> String {
    format!(
        r#"echo '{{"health": "check"}}' | nc 127.0.0.1 {} || exit 1"#,
        port
    )
}

fn check_range(name: &str, value: u32, range: &RangeInclusive<u32>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(AwsError::InvalidSetting(format!(
            "router health check {} must be {}-{}: {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

/// Limits ECS puts on container health checks
pub fn validate_health_check(health: &HealthCheckSettings) -> Result<()> {
    check_range("interval", health.interval_secs, &HEALTH_INTERVAL)?;
    check_range("timeout", health.timeout_secs, &HEALTH_TIMEOUT)?;
    check_range("retries", health.retries, &HEALTH_RETRIES)?;
    check_range("start period", health.start_period_secs, &HEALTH_START_PERIOD)?;
    Ok(())
}

/// Fargate only runs certain CPU / memory combinations
pub fn validate_task_size(cpu: u32, memory_mib: u32) -> Result<()> {
    let valid = match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&memory_mib) && memory_mib % 1024 == 0,
        1024 => (2048..=8192).contains(&memory_mib) && memory_mib % 1024 == 0,
        2048 => (4096..=16384).contains(&memory_mib) && memory_mib % 1024 == 0,
        4096 => (8192..=30720).contains(&memory_mib) && memory_mib % 1024 == 0,
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AwsError::InvalidSetting(format!(
            "Fargate does not support cpu {} with {} MiB of memory",
            cpu, memory_mib
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LogPathLayout;
    use crate::log_infra::LogInfra;
    use firelens_cloud::Stack;
    use firelens_core::{DeliverySettings, Prefix};

    struct Fixture {
        naming: Naming,
        env: AwsEnv,
        app: AppSettings,
        router: RouterSettings,
        network: Option<NetworkSettings>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                naming: Naming::new(Prefix::new("acme").unwrap(), None),
                env: AwsEnv::default(),
                app: AppSettings::default(),
                router: RouterSettings::default(),
                network: None,
            }
        }

        fn compose(&self) -> Result<(Stack, ContainerOutput)> {
            let mut stack = Stack::new("acme-FirelensStack");
            let logs = stack.compose(LogInfra {
                naming: &self.naming,
                env: &self.env,
                layout: &LogPathLayout::default(),
                delivery: &DeliverySettings::default(),
            })?;
            let output = stack.compose(Container {
                naming: &self.naming,
                env: &self.env,
                app: &self.app,
                router: &self.router,
                network: self.network.as_ref(),
                delivery_stream: &logs.delivery_stream,
            })?;
            Ok((stack, output))
        }
    }

    fn container_definitions(stack: &Stack) -> Vec<Value> {
        stack
            .resource("TaskDefinition")
            .and_then(|r| r.get_property("ContainerDefinitions"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_task_policy_targets() {
        let (stack, output) = Fixture::new().compose().unwrap();
        let policy = stack
            .resource(output.task_policy.logical_id())
            .unwrap();

        let statements = policy
            .property_at(&["PolicyDocument", "Statement"])
            .unwrap();
        assert_eq!(statements[0]["Resource"], json!([output.app_log_group.arn()]));
        assert_eq!(
            statements[1]["Resource"],
            json!([{ "Fn::GetAtt": ["FirehoseStream", "Arn"] }])
        );
        assert_eq!(statements[1]["Action"], json!(["firehose:PutRecordBatch"]));
        assert_eq!(policy.get_property("Roles"), Some(&json!([{ "Ref": "TaskRole" }])));
    }

    #[test]
    fn test_router_sidecar() {
        let (stack, _) = Fixture::new().compose().unwrap();
        let containers = container_definitions(&stack);
        let router = &containers[1];

        assert_eq!(router["Name"], json!("log_router"));
        assert_eq!(router["Essential"], json!(true));
        assert_eq!(router["FirelensConfiguration"]["Type"], json!("fluentbit"));
        assert_eq!(
            router["FirelensConfiguration"]["Options"]["config-file-value"],
            json!("/fluent-bit/etc/extra.conf")
        );
        assert_eq!(
            router["FirelensConfiguration"]["Options"]["enable-ecs-log-metadata"],
            json!("true")
        );
        assert_eq!(router["HealthCheck"]["Interval"], json!(180));
        assert_eq!(router["HealthCheck"]["Timeout"], json!(30));
        assert_eq!(router["HealthCheck"]["Retries"], json!(3));
        assert_eq!(router["HealthCheck"]["StartPeriod"], json!(180));
        assert_eq!(
            router["HealthCheck"]["Command"][1],
            json!(r#"echo '{"health": "check"}' | nc 127.0.0.1 8877 || exit 1"#)
        );
        assert_eq!(
            router["Environment"],
            json!([
                { "Name": "LOG_GROUP_NAME", "Value": { "Ref": "FlaskLog" } },
                { "Name": "FIREHOSE_STREAM_NAME", "Value": { "Ref": "FirehoseStream" } }
            ])
        );
    }

    #[test]
    fn test_app_container_uses_firelens_driver() {
        let (stack, _) = Fixture::new().compose().unwrap();
        let containers = container_definitions(&stack);
        let web = &containers[0];

        assert_eq!(web["Name"], json!("web"));
        assert_eq!(web["Essential"], json!(true));
        assert_eq!(web["LogConfiguration"]["LogDriver"], json!("awsfirelens"));
        assert_eq!(web["PortMappings"][0]["ContainerPort"], json!(5000));
        assert_eq!(
            web["DependsOn"],
            json!([{ "ContainerName": "log_router", "Condition": "START" }])
        );

        let service = stack.resource("Service").unwrap();
        assert_eq!(service.get_property("DesiredCount"), Some(&json!(1)));

        let task = stack.resource("TaskDefinition").unwrap();
        assert_eq!(task.get_property("Cpu"), Some(&json!("512")));
        assert_eq!(task.get_property("Memory"), Some(&json!("1024")));

        let target_group = stack.resource("TargetGroup").unwrap();
        assert_eq!(
            target_group.get_property("HealthCheckPath"),
            Some(&json!("/health"))
        );
    }

    #[test]
    fn test_network_parameters_or_fixed_ids() {
        let (stack, _) = Fixture::new().compose().unwrap();
        assert!(stack.parameters().contains_key("VpcId"));
        assert!(stack.parameters().contains_key("SubnetIds"));

        let mut fixture = Fixture::new();
        let mut network = NetworkSettings::new("vpc-123");
        network.subnet_ids = vec!["subnet-a".into(), "subnet-b".into()];
        fixture.network = Some(network);

        let (stack, _) = fixture.compose().unwrap();
        assert!(stack.parameters().is_empty());
        let lb = stack.resource("LoadBalancer").unwrap();
        assert_eq!(lb.get_property("Subnets"), Some(&json!(["subnet-a", "subnet-b"])));
    }

    #[test]
    fn test_log_groups() {
        let (stack, _) = Fixture::new().compose().unwrap();
        let flask = stack.resource("FlaskLog").unwrap();
        assert_eq!(
            flask.get_property("LogGroupName"),
            Some(&json!("acme-flask-error-log"))
        );
        assert_eq!(flask.get_property("RetentionInDays"), Some(&json!(1)));
        let router = stack.resource("FirelensLog").unwrap();
        assert_eq!(router.get_property("LogGroupName"), Some(&json!("acme-firelens-log")));
    }

    #[test]
    fn test_invalid_health_check() {
        let mut fixture = Fixture::new();
        fixture.router.health_check.interval_secs = 600;
        assert!(matches!(fixture.compose(), Err(AwsError::InvalidSetting(_))));

        let mut fixture = Fixture::new();
        fixture.router.health_check.retries = 0;
        assert!(matches!(fixture.compose(), Err(AwsError::InvalidSetting(_))));
    }

    #[test]
    fn test_task_size() {
        assert!(validate_task_size(512, 1024).is_ok());
        assert!(validate_task_size(256, 512).is_ok());
        assert!(validate_task_size(512, 512).is_err());
        assert!(validate_task_size(300, 1024).is_err());
    }

    #[test]
    fn test_unsupported_retention() {
        let mut fixture = Fixture::new();
        fixture.app.log_retention_days = 2;
        assert!(matches!(fixture.compose(), Err(AwsError::InvalidSetting(_))));
    }
}
