//! SQLite Persistence - SQLite 数据库持久化实现

mod database;
mod entity_repo;

pub use database::*;
pub use entity_repo::*;
