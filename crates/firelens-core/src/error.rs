use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error(
        "prefix が指定されていません\nヒント: --prefix <PREFIX>、FIRELENS_PREFIX 環境変数、または firelens.kdl の prefix ノードで指定してください"
    )]
    MissingPrefix,

    #[error("無効な prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
