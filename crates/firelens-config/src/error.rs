use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: firelens.kdl, .firelens.kdl\n\
        - ./.firelens/ ディレクトリ\n\
        - ~/.config/firelens/firelens.kdl\n\
        または FIRELENS_CONFIG_PATH 環境変数で直接指定できます"
    )]
    StackFileNotFound,

    #[error("FIRELENS_CONFIG_PATH が存在しないファイルを指しています: {0}")]
    ConfigPathMissing(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
