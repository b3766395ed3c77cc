//! スタック設定
//!
//! firelens.kdl の内容そのもの。prefix は未指定を許容し、
//! [`StackSettings::resolve`](crate::model::StackSettings::resolve) で検証する。

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// firelens.kdl 全体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackSettings {
    /// スタック名（未指定時は `{prefix}-FirelensStack`）
    pub stack_name: Option<String>,

    /// リソース名の prefix
    pub prefix: Option<String>,

    /// AWS アカウントID（バケット名のサフィックスに使用）
    pub account: Option<String>,

    /// リージョン（未指定時はデプロイ先リージョン）
    pub region: Option<String>,

    pub app: AppSettings,
    pub router: RouterSettings,
    pub delivery: DeliverySettings,
    pub catalog: CatalogSettings,

    /// 未指定時はテンプレートパラメータ (VpcId, SubnetIds) として公開
    pub network: Option<NetworkSettings>,
}

/// アプリケーションコンテナ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// 事前に作成済みのECRリポジトリ名
    pub repository: String,
    pub tag: String,
    pub container_port: u16,
    pub health_check_path: String,
    /// CPUユニット (1024 = 1 vCPU)
    pub cpu: u32,
    pub memory_mib: u32,
    pub desired_count: u32,
    /// エラーログの保持日数
    pub log_retention_days: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            repository: "flask-repository".to_string(),
            tag: "latest".to_string(),
            container_port: 5000,
            health_check_path: "/health".to_string(),
            cpu: 512,
            memory_mib: 1024,
            desired_count: 1,
            log_retention_days: 1,
        }
    }
}

/// FireLens ログルーター（サイドカー）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSettings {
    pub repository: String,
    pub tag: String,
    /// イメージ内の fluent-bit 追加設定ファイル
    pub config_file: String,
    /// ヘルスチェック用 TCP ポート
    pub health_port: u16,
    pub health_check: HealthCheckSettings,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            repository: "firelens-repository".to_string(),
            tag: "latest".to_string(),
            config_file: "/fluent-bit/etc/extra.conf".to_string(),
            health_port: 8877,
            health_check: HealthCheckSettings::default(),
        }
    }
}

/// コンテナヘルスチェックのタイミング
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSettings {
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub retries: u32,
    pub start_period_secs: u32,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            interval_secs: 180,
            timeout_secs: 30,
            retries: 3,
            start_period_secs: 180,
        }
    }
}

/// 配信ストリームのバッファリング
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySettings {
    pub buffer_interval_secs: u32,
    pub buffer_size_mb: u32,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            buffer_interval_secs: 300,
            buffer_size_mb: 5,
        }
    }
}

/// カタログテーブルのパーティション射影
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// 射影範囲の開始日
    pub projection_start: NaiveDate,
    /// 射影範囲の終端 `NOW+{n}HOUR`（JSTなら 9）
    pub projection_offset_hours: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            projection_start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            projection_offset_hours: 9,
        }
    }
}

/// 既存ネットワーク
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    /// パブリックサブネットで ECR から pull するため既定で有効
    pub assign_public_ip: bool,
}

impl NetworkSettings {
    pub fn new(vpc_id: impl Into<String>) -> Self {
        Self {
            vpc_id: vpc_id.into(),
            subnet_ids: Vec::new(),
            assign_public_ip: true,
        }
    }
}
