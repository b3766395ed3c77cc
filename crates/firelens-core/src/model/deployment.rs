//! prefix を解決済みのデプロイ設定

use super::settings::{
    AppSettings, CatalogSettings, DeliverySettings, NetworkSettings, RouterSettings,
    StackSettings,
};
use crate::error::{CoreError, Result};
use crate::prefix::Prefix;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 合成の入力となる、検証済みの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub prefix: Prefix,
    pub stack_name: String,
    pub account: Option<String>,
    pub region: Option<String>,
    pub app: AppSettings,
    pub router: RouterSettings,
    pub delivery: DeliverySettings,
    pub catalog: CatalogSettings,
    pub network: Option<NetworkSettings>,
}

impl Deployment {
    /// デフォルト設定で prefix だけを指定
    pub fn for_prefix(prefix: &str) -> Result<Self> {
        StackSettings::default().resolve(Some(prefix))
    }
}

impl StackSettings {
    /// prefix を確定させて [`Deployment`] に変換
    ///
    /// `prefix_override`（CLI引数・環境変数）が設定ファイルより優先される。
    /// どちらにも無い場合は [`CoreError::MissingPrefix`]。
    pub fn resolve(self, prefix_override: Option<&str>) -> Result<Deployment> {
        let raw = prefix_override
            .map(str::to_string)
            .or(self.prefix)
            .ok_or(CoreError::MissingPrefix)?;
        let prefix = Prefix::new(raw.trim())?;

        if let Some(account) = &self.account
            && (account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(CoreError::InvalidConfig(format!(
                "account は12桁の数字で指定してください: {}",
                account
            )));
        }

        if let Some(network) = &self.network
            && network.subnet_ids.is_empty()
        {
            return Err(CoreError::InvalidConfig(
                "network には subnets を1つ以上指定してください".to_string(),
            ));
        }

        let stack_name = self
            .stack_name
            .map(|name| format!("{}-{}", prefix, name.trim()))
            .unwrap_or_else(|| format!("{}-FirelensStack", prefix));
        validate_stack_name(&stack_name)?;

        tracing::debug!(prefix = %prefix, stack = %stack_name, "Resolved deployment settings");

        Ok(Deployment {
            prefix,
            stack_name,
            account: self.account,
            region: self.region,
            app: self.app,
            router: self.router,
            delivery: self.delivery,
            catalog: self.catalog,
            network: self.network,
        })
    }
}

/// CloudFormation のスタック名の上限
pub const MAX_STACK_NAME_LEN: usize = 128;

const STACK_NAME_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9-]*$";

/// スタック名はテンプレートのファイル名にも使うため、区切り文字などは不可
fn validate_stack_name(name: &str) -> Result<()> {
    let pattern = Regex::new(STACK_NAME_PATTERN)
        .map_err(|e| CoreError::InvalidConfig(format!("正規表現のコンパイルエラー: {}", e)))?;
    if !pattern.is_match(name) || name.ends_with('-') {
        return Err(CoreError::InvalidConfig(format!(
            "スタック名は英字で始まり、英数字とハイフンのみ使用できます: {}",
            name
        )));
    }
    if name.len() > MAX_STACK_NAME_LEN {
        return Err(CoreError::InvalidConfig(format!(
            "スタック名は{}文字以内で指定してください: {}",
            MAX_STACK_NAME_LEN, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_override() {
        let settings = StackSettings {
            prefix: Some("from-file".to_string()),
            ..Default::default()
        };

        let deployment = settings.resolve(Some("acme")).unwrap();
        assert_eq!(deployment.prefix.as_str(), "acme");
        assert_eq!(deployment.stack_name, "acme-FirelensStack");
    }

    #[test]
    fn test_resolve_from_file() {
        let settings = StackSettings {
            prefix: Some("team-a".to_string()),
            stack_name: Some("Logs".to_string()),
            ..Default::default()
        };

        let deployment = settings.resolve(None).unwrap();
        assert_eq!(deployment.prefix.as_str(), "team-a");
        assert_eq!(deployment.stack_name, "team-a-Logs");
    }

    #[test]
    fn test_resolve_missing_prefix() {
        let err = StackSettings::default().resolve(None).unwrap_err();
        assert!(matches!(err, CoreError::MissingPrefix));
        assert!(err.to_string().contains("--prefix"));
    }

    #[test]
    fn test_resolve_invalid_prefix() {
        let err = StackSettings::default().resolve(Some("Bad_Prefix")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPrefix { .. }));
    }

    #[test]
    fn test_resolve_rejects_unsafe_stack_name() {
        for name in ["../x", "Logs/Prod", "Logs.Prod", "", "Logs-"] {
            let settings = StackSettings {
                stack_name: Some(name.to_string()),
                ..Default::default()
            };
            let err = settings.resolve(Some("acme")).unwrap_err();
            assert!(matches!(err, CoreError::InvalidConfig(_)), "{:?}", name);
        }
    }

    #[test]
    fn test_resolve_stack_name_length() {
        let fits = "a".repeat(MAX_STACK_NAME_LEN - "acme-".len());
        let settings = StackSettings {
            stack_name: Some(fits.clone()),
            ..Default::default()
        };
        assert!(settings.resolve(Some("acme")).is_ok());

        let settings = StackSettings {
            stack_name: Some(format!("{}a", fits)),
            ..Default::default()
        };
        assert!(settings.resolve(Some("acme")).is_err());
    }

    #[test]
    fn test_resolve_invalid_account() {
        let settings = StackSettings {
            account: Some("12345".to_string()),
            ..Default::default()
        };
        let err = settings.resolve(Some("acme")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_resolve_network_without_subnets() {
        let settings = StackSettings {
            network: Some(NetworkSettings::new("vpc-123")),
            ..Default::default()
        };
        assert!(settings.resolve(Some("acme")).is_err());
    }

    #[test]
    fn test_defaults() {
        let deployment = Deployment::for_prefix("acme").unwrap();
        assert_eq!(deployment.app.cpu, 512);
        assert_eq!(deployment.app.memory_mib, 1024);
        assert_eq!(deployment.app.container_port, 5000);
        assert_eq!(deployment.router.config_file, "/fluent-bit/etc/extra.conf");
        assert_eq!(deployment.delivery.buffer_interval_secs, 300);
        assert_eq!(deployment.delivery.buffer_size_mb, 5);
        assert_eq!(deployment.catalog.projection_offset_hours, 9);
        assert!(deployment.network.is_none());
        assert_eq!(deployment.app.desired_count, 1);
        assert_eq!(deployment.router.health_port, 8877);
        assert_eq!(deployment.router.health_check.retries, 3);
        assert_eq!(deployment.router.health_check.start_period_secs, 180);
    }
}
