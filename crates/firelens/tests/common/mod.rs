use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_firelens_kdl(&self, content: &str) {
        fs::write(self.root.path().join("firelens.kdl"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_local_kdl(&self, content: &str) {
        fs::write(self.root.path().join("firelens.local.kdl"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// プロジェクト内で実行し、ホストの設定・環境変数の影響を受けないコマンド
    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("firelens").unwrap();
        cmd.current_dir(self.path())
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env("HOME", self.path().join("home"))
            .env_remove("FIRELENS_PREFIX")
            .env_remove("FIRELENS_CONFIG_PATH")
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }
}
