//! Memory Layer - In-Memory State Management
//!
//! 实现 ChatSessionManager 和内存实体仓储

mod entity_store;
mod session_manager;

pub use entity_store::InMemoryEntityRepository;
pub use session_manager::InMemoryChatSessionManager;
