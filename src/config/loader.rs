//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, LlmMode, StorageBackend};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `STORYLOOM_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `STORYLOOM_SERVER__PORT=8080`
/// - `STORYLOOM_LLM__BASE_URL=https://api.openai.com/v1`
/// - `STORYLOOM_LLM__API_KEY=sk-...`
/// - `STORYLOOM_STORAGE__BACKEND=memory`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5070)?
        .set_default("llm.mode", "http")?
        .set_default("llm.base_url", "http://localhost:11434/v1")?
        .set_default("llm.timeout_secs", 300)?
        .set_default("database.path", "data/storyloom.db")?
        .set_default("database.max_connections", 5)?
        .set_default("storage.backend", "sqlite")?
        .set_default("chat.history_limit", 20)?
        .set_default("chat.session_expire_secs", 3600)?
        .set_default("chat.cleanup_interval_secs", 60)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        // 搜索默认配置文件
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 例如: STORYLOOM_LLM__MODEL=gpt-4o
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("STORYLOOM")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    // 4. 构建配置
    let config = builder.build()?;

    // 5. 反序列化为 AppConfig
    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    // 6. 验证配置
    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    // 验证端口范围
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    // http 模式需要服务地址
    if config.llm.mode == LlmMode::Http && config.llm.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "LLM base URL cannot be empty in http mode".to_string(),
        ));
    }

    // 验证数据库路径
    if config.storage.backend == StorageBackend::Sqlite && config.database.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Database path cannot be empty for the sqlite backend".to_string(),
        ));
    }

    if config.chat.history_limit == 0 {
        return Err(ConfigError::ValidationError(
            "Chat history limit must be greater than 0".to_string(),
        ));
    }

    if config.chat.cleanup_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Session cleanup interval cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("LLM Mode: {:?}", config.llm.mode);
    match config.llm.mode {
        LlmMode::Http => {
            tracing::info!("LLM URL: {}", config.llm.base_url);
            tracing::info!("LLM Model: {}", config.llm.model);
            tracing::info!("LLM API Key: {}", config.llm.masked_api_key());
            tracing::info!("LLM Timeout: {}s", config.llm.timeout_secs);
        }
        LlmMode::Scripted => {
            tracing::info!("Scripted Chunk Size: {} chars", config.llm.scripted_chunk_chars);
        }
    }
    tracing::info!("Storage Backend: {:?}", config.storage.backend);
    if config.storage.backend == StorageBackend::Sqlite {
        tracing::info!("Database: {}", config.database.path);
        tracing::info!("Database Max Connections: {}", config.database.max_connections);
    }
    tracing::info!("Chat History Limit: {}", config.chat.history_limit);
    tracing::info!("Session Expire: {}s", config.chat.session_expire_secs);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_llm_url_only_matters_in_http_mode() {
        let mut config = AppConfig::default();
        config.llm.base_url = String::new();
        assert!(validate_config(&config).is_err());

        config.llm.mode = LlmMode::Scripted;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_db_path_only_matters_for_sqlite() {
        let mut config = AppConfig::default();
        config.database.path = String::new();
        assert!(validate_config(&config).is_err());

        config.storage.backend = StorageBackend::Memory;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_history_limit() {
        let mut config = AppConfig::default();
        config.chat.history_limit = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[llm]
mode = "scripted"
scripted_chunk_chars = 3

[storage]
backend = "memory"

[chat]
history_limit = 6
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.llm.mode, LlmMode::Scripted);
        assert_eq!(config.llm.scripted_chunk_chars, 3);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.chat.history_limit, 6);
        assert_eq!(config.chat.session_expire_secs, 3600);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[chat]\nhistory_limit = 0").unwrap();

        assert!(matches!(
            load_config_from_path(Some(file.path())),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
