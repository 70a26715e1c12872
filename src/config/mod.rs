use serde::Deserialize;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Runtime configuration, resolved once from the process environment.
///
/// Every field can be overridden through an environment variable of the
/// same name in SCREAMING_SNAKE_CASE (a `.env` file is honored too).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_upload_limit_mib")]
    pub upload_limit_mib: u64,
}

pub static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(|| {
    dotenv::dotenv().ok();
    envy::from_env().expect("Failed to read configuration from environment")
});

fn default_staging_root() -> PathBuf {
    PathBuf::from("./upload")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db/pixelock.redb")
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("./scripts")
}

fn default_port() -> u16 {
    8000
}

fn default_upload_limit_mib() -> u64 {
    50
}
