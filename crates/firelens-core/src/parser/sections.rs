//! セクションノード（app / router / delivery / catalog / network）のパース

use super::{required_int, required_string, string_args};
use crate::error::{CoreError, Result};
use crate::model::{
    AppSettings, CatalogSettings, DeliverySettings, HealthCheckSettings, NetworkSettings,
    RouterSettings,
};
use chrono::NaiveDate;
use kdl::KdlNode;

/// app ノードをパース
pub fn parse_app(node: &KdlNode, app: &mut AppSettings) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "repository" => app.repository = required_string(child)?,
            "tag" => app.tag = required_string(child)?,
            "port" | "container-port" | "container_port" => {
                app.container_port = required_int(child)?
            }
            "health-check" | "health_check" => app.health_check_path = required_string(child)?,
            "cpu" => app.cpu = required_int(child)?,
            "memory" => app.memory_mib = required_int(child)?,
            "desired-count" | "desired_count" => app.desired_count = required_int(child)?,
            "log-retention" | "log_retention" => app.log_retention_days = required_int(child)?,
            other => return Err(unknown("app", other)),
        }
    }

    if !app.health_check_path.starts_with('/') {
        return Err(CoreError::InvalidConfig(format!(
            "health-check は / で始まるパスを指定してください: {}",
            app.health_check_path
        )));
    }

    Ok(())
}

/// router ノードをパース
pub fn parse_router(node: &KdlNode, router: &mut RouterSettings) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "repository" => router.repository = required_string(child)?,
            "tag" => router.tag = required_string(child)?,
            "config-file" | "config_file" => router.config_file = required_string(child)?,
            "health-port" | "health_port" => router.health_port = required_int(child)?,
            "health-check" | "health_check" => {
                parse_health_check(child, &mut router.health_check)?
            }
            other => return Err(unknown("router", other)),
        }
    }

    Ok(())
}

/// ヘルスチェックのタイミング（秒）
fn parse_health_check(node: &KdlNode, health_check: &mut HealthCheckSettings) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "interval" => health_check.interval_secs = required_int(child)?,
            "timeout" => health_check.timeout_secs = required_int(child)?,
            "retries" => health_check.retries = required_int(child)?,
            "start-period" | "start_period" => {
                health_check.start_period_secs = required_int(child)?
            }
            other => return Err(unknown("health-check", other)),
        }
    }

    Ok(())
}

/// delivery ノードをパース
pub fn parse_delivery(node: &KdlNode, delivery: &mut DeliverySettings) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "buffer-interval" | "buffer_interval" => {
                delivery.buffer_interval_secs = required_int(child)?
            }
            "buffer-size" | "buffer_size" => delivery.buffer_size_mb = required_int(child)?,
            other => return Err(unknown("delivery", other)),
        }
    }

    Ok(())
}

/// catalog ノードをパース
pub fn parse_catalog(node: &KdlNode, catalog: &mut CatalogSettings) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "projection-start" | "projection_start" => {
                let raw = required_string(child)?;
                catalog.projection_start = parse_date(&raw)?;
            }
            "projection-offset-hours" | "projection_offset_hours" => {
                catalog.projection_offset_hours = required_int(child)?
            }
            other => return Err(unknown("catalog", other)),
        }
    }

    Ok(())
}

/// network ノードをパース
pub fn parse_network(node: &KdlNode, network: &mut Option<NetworkSettings>) -> Result<()> {
    let Some(children) = node.children() else {
        return Err(CoreError::InvalidConfig(
            "network には vpc と subnets を指定してください".to_string(),
        ));
    };

    let mut vpc_id = network.as_ref().map(|n| n.vpc_id.clone());
    let mut subnet_ids = network
        .as_ref()
        .map(|n| n.subnet_ids.clone())
        .unwrap_or_default();
    let mut assign_public_ip = network.as_ref().is_none_or(|n| n.assign_public_ip);

    for child in children.nodes() {
        match child.name().value() {
            "vpc" | "vpc-id" | "vpc_id" => vpc_id = Some(required_string(child)?),
            "subnets" | "subnet-ids" | "subnet_ids" => subnet_ids = string_args(child),
            "public-ip" | "public_ip" => {
                assign_public_ip = match required_string(child)?.as_str() {
                    "enabled" => true,
                    "disabled" => false,
                    other => {
                        return Err(CoreError::InvalidConfig(format!(
                            "public-ip は enabled / disabled のいずれかです: {}",
                            other
                        )));
                    }
                }
            }
            other => return Err(unknown("network", other)),
        }
    }

    let vpc_id = vpc_id
        .ok_or_else(|| CoreError::InvalidConfig("network には vpc が必要です".to_string()))?;

    *network = Some(NetworkSettings {
        vpc_id,
        subnet_ids,
        assign_public_ip,
    });

    Ok(())
}

/// `2023/01/01` と `2023-01-01` の両方を受け付ける
fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| CoreError::InvalidConfig(format!("日付の形式が不正です: {}", raw)))
}

fn unknown(section: &str, key: &str) -> CoreError {
    CoreError::InvalidConfig(format!("{} に未知の設定があります: {}", section, key))
}
