//! Storyloom - 流式命令协议驱动的 AI 故事创作助手
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Command Context: 命令语法、增量扫描、载荷解码
//! - Story Context: 故事实体的值对象
//!
//! 应用层 (application/):
//! - Ports: 端口定义（TokenSource, CommandHandler, EntityRepository, ChatSession, TurnEvent）
//! - Dispatch: 分发协调器、分发记录、流式展示、回合驱动
//! - Commands: CQRS 命令处理器（对话回合 + 故事实体命令）
//! - Queries: CQRS 查询处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + WebSocket
//! - Memory: ChatSessionManager、实体仓储内存实现
//! - Worker: SessionReaper 后台回收空闲会话
//! - Persistence: SQLite 存储
//! - Adapters: LLM Token Source（HTTP 流式 / 回放）
//! - Events: 回合事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
