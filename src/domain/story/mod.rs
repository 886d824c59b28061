//! Story Context - 故事创作限界上下文
//!
//! 命令处理器操作的实体（故事、角色、章节、大纲、对白）的共享值对象。
//! 实体本身的持久化属于外部 CRUD 层。

mod value_objects;

pub use value_objects::{DialogueType, EntityId, EntityKind, StoryStatus};
