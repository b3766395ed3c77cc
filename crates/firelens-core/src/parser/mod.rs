//! KDLパーサー
//!
//! firelens.kdl をパースします。パース結果は既存の [`StackSettings`] に
//! 上書き適用されるため、ローカルオーバーライドは差分だけを書けば良い。
//!
//! ```kdl
//! prefix "acme"
//! account "123456789012"
//! region "ap-northeast-1"
//!
//! app {
//!     repository "flask-repository"
//!     cpu 512
//!     memory 1024
//! }
//!
//! network {
//!     vpc "vpc-0abc"
//!     subnets "subnet-a" "subnet-b"
//! }
//! ```

mod sections;

use sections::{parse_app, parse_catalog, parse_delivery, parse_network, parse_router};

use crate::error::{CoreError, Result};
use crate::model::StackSettings;
use kdl::{KdlDocument, KdlNode};
use std::fs;
use std::path::Path;

/// KDLファイルをパースして StackSettings を生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<StackSettings> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| CoreError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_kdl_string(&content)
}

/// KDL文字列をパース
pub fn parse_kdl_string(content: &str) -> Result<StackSettings> {
    let mut settings = StackSettings::default();
    apply_kdl_string(&mut settings, content)?;
    Ok(settings)
}

/// KDL文字列の内容を既存の設定に上書き適用
pub fn apply_kdl_string(settings: &mut StackSettings, content: &str) -> Result<()> {
    let doc: KdlDocument = content.parse()?;

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => settings.stack_name = Some(required_string(node)?),
            "prefix" => settings.prefix = Some(required_string(node)?),
            "account" => settings.account = Some(required_string(node)?),
            "region" => settings.region = Some(required_string(node)?),
            "app" => parse_app(node, &mut settings.app)?,
            "router" => parse_router(node, &mut settings.router)?,
            "delivery" => parse_delivery(node, &mut settings.delivery)?,
            "catalog" => parse_catalog(node, &mut settings.catalog)?,
            "network" => parse_network(node, &mut settings.network)?,
            other => {
                tracing::warn!(node = other, "Unknown node in firelens.kdl, skipping");
            }
        }
    }

    Ok(())
}

/// 最初の引数を文字列として取得
pub(crate) fn string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn required_string(node: &KdlNode) -> Result<String> {
    string_arg(node).ok_or_else(|| {
        CoreError::InvalidConfig(format!("{} には文字列を指定してください", node.name().value()))
    })
}

/// 最初の引数を整数として取得し、範囲チェック付きで変換
pub(crate) fn required_int<T: TryFrom<i128>>(node: &KdlNode) -> Result<T> {
    let name = node.name().value();
    let value = node
        .entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| CoreError::InvalidConfig(format!("{} には整数を指定してください", name)))?;

    T::try_from(value)
        .map_err(|_| CoreError::InvalidConfig(format!("{} の値が範囲外です: {}", name, value)))
}

/// 全引数を文字列リストとして取得
pub(crate) fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}
