//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 模型服务配置
    #[serde(default)]
    pub llm: LlmConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 对话配置
    #[serde(default)]
    pub chat: ChatConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token Source 模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    /// OpenAI 兼容的流式 HTTP 服务
    #[default]
    Http,
    /// 回放固定回复（离线演示）
    Scripted,
}

/// 模型服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub mode: LlmMode,

    /// 服务基础 URL（不含 /chat/completions）
    #[serde(default = "default_llm_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// 单个回合的请求超时（秒）
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// scripted 模式回放的回复
    #[serde(default = "default_scripted_reply")]
    pub scripted_reply: String,

    /// scripted 模式每个片段的字符数
    #[serde(default = "default_scripted_chunk_chars")]
    pub scripted_chunk_chars: usize,
}

fn default_llm_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    300
}

fn default_scripted_reply() -> String {
    "Here is a new story for you.\n\
/create-story {\"title\": \"The Lantern Keeper\", \"description\": \"A lighthouse keeper finds a map in a bottle.\", \"mainCategory\": \"Adventure\", \"suggestedTags\": [\"sea\", \"mystery\"]}\n\
/create-character {\"name\": \"Mara\", \"role\": \"protagonist\", \"personality\": \"stubborn, curious\"}\n\
/create-chapter {\"title\": \"The Bottle\"}\n"
        .to_string()
}

fn default_scripted_chunk_chars() -> usize {
    8
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: LlmMode::default(),
            base_url: default_llm_url(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: None,
            max_tokens: None,
            scripted_reply: default_scripted_reply(),
            scripted_chunk_chars: default_scripted_chunk_chars(),
        }
    }
}

impl LlmConfig {
    /// 用于日志的 API key（只保留末尾 4 个字符）
    pub fn masked_api_key(&self) -> String {
        match self.api_key.as_deref() {
            None | Some("") => "<none>".to_string(),
            Some(key) => {
                let chars: Vec<char> = key.chars().collect();
                if chars.len() <= 4 {
                    "****".to_string()
                } else {
                    let tail: String = chars[chars.len() - 4..].iter().collect();
                    format!("****{}", tail)
                }
            }
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/storyloom.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// 实体存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    /// 重启后数据丢失
    Memory,
}

/// 存储配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

/// 对话配置
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// 每个会话保留的历史消息条数
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// 空闲会话过期时间（秒）
    #[serde(default = "default_session_expire")]
    pub session_expire_secs: u64,

    /// 过期检查间隔（秒）
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_history_limit() -> usize {
    20
}

fn default_session_expire() -> u64 {
    3600 // 1 小时
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            session_expire_secs: default_session_expire(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LogConfig {
    /// 默认的 EnvFilter 指令（RUST_LOG 未设置时使用）
    pub fn filter_directive(&self) -> String {
        format!(
            "{level},storyloom={level},tower_http=debug",
            level = self.level
        )
    }
}
