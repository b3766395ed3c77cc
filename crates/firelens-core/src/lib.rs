//! firelens の設定モデル
//!
//! firelens.kdl をパースしてスタック設定（[`StackSettings`]）を生成し、
//! prefix を検証した上でデプロイ単位の設定（[`Deployment`]）に解決します。

pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod prefix;

pub use error::{CoreError, Result};
pub use loader::{load_settings, load_settings_with_override};
pub use model::*;
pub use parser::{apply_kdl_string, parse_kdl_file, parse_kdl_string};
pub use prefix::Prefix;
