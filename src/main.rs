//! Storyloom - AI 故事创作助手
//!
//! - Domain: command/, story/ (Bounded Contexts)
//! - Application: dispatch, commands, queries, ports
//! - Infrastructure: http, memory, worker, persistence, adapters, events

use std::sync::Arc;

use storyloom::application::{EntityRepositoryPort, TokenSourcePort};
use storyloom::config::{load_config, print_config, AppConfig, LlmMode, StorageBackend};
use storyloom::infrastructure::adapters::{
    HttpTokenSource, HttpTokenSourceConfig, ScriptedTokenSource,
};
use storyloom::infrastructure::events::EventPublisher;
use storyloom::infrastructure::http::{AppState, HttpServer, ServerConfig};
use storyloom::infrastructure::memory::{InMemoryChatSessionManager, InMemoryEntityRepository};
use storyloom::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteEntityRepository,
};
use storyloom::infrastructure::worker::{SessionReaper, SessionReaperConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("Storyloom - AI 故事创作助手");
    print_config(&config);

    // 创建实体仓储
    let entity_repo = build_entity_repo(&config).await?;

    // 创建 Token Source
    let token_source: Arc<dyn TokenSourcePort> = match config.llm.mode {
        LlmMode::Http => {
            let llm_config = HttpTokenSourceConfig::new(config.llm.base_url.clone())
                .with_timeout(config.llm.timeout_secs)
                .with_model(config.llm.model.clone())
                .with_api_key(config.llm.api_key.clone())
                .with_sampling(config.llm.temperature, config.llm.max_tokens);
            let source = HttpTokenSource::new(llm_config)?;
            if !source.health_check().await {
                tracing::warn!(url = %config.llm.base_url, "LLM service health check failed, turns may fail");
            }
            Arc::new(source)
        }
        LlmMode::Scripted => Arc::new(ScriptedTokenSource::new(
            config.llm.scripted_reply.clone(),
            config.llm.scripted_chunk_chars,
        )),
    };

    // 创建事件发布器和会话管理器
    let event_publisher = EventPublisher::new().arc();
    let sessions = Arc::new(InMemoryChatSessionManager::new());

    // 启动空闲会话回收
    let shutdown = CancellationToken::new();
    let reaper = SessionReaper::new(
        SessionReaperConfig {
            interval_secs: config.chat.cleanup_interval_secs,
            expire_secs: config.chat.session_expire_secs,
        },
        sessions.clone(),
        event_publisher.clone(),
    );
    let reaper_handle = tokio::spawn(reaper.run(shutdown.clone()));

    // 创建 HTTP 服务器
    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        sessions,
        entity_repo,
        token_source,
        event_publisher,
        config.chat.history_limit,
    ));

    let server = HttpServer::new(server_config, state);

    tracing::info!("Starting HTTP server...");

    // 启动服务器（带优雅关闭）
    let server_shutdown = shutdown.clone();
    server
        .run_with_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Received shutdown signal");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = reaper_handle.await;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// 初始化日志（RUST_LOG 优先于配置）
fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log.filter_directive()));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// 按配置选择实体存储后端
async fn build_entity_repo(config: &AppConfig) -> anyhow::Result<Arc<dyn EntityRepositoryPort>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory entity storage, data is lost on restart");
            Ok(Arc::new(InMemoryEntityRepository::new()))
        }
        StorageBackend::Sqlite => {
            // 确保数据目录存在
            if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }

            let db_config = DatabaseConfig::new(&config.database.path)
                .with_max_connections(config.database.max_connections);
            let pool = create_pool(&db_config).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(SqliteEntityRepository::new(pool)))
        }
    }
}
