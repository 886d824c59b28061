//! Command Context - 流式命令协议
//!
//! 职责:
//! - 命令语法注册表（标记 -> 载荷形态 + 前置条件）
//! - 增量扫描：从不断增长的累积文本中找出完整命令
//! - 载荷解码：原始 JSON 文本 -> 强类型参数

mod decoder;
mod errors;
mod grammar;
mod kind;
mod params;
mod scanner;

pub use decoder::{decode, decode_payload, DecodedCommand};
pub use errors::CommandError;
pub use grammar::{CommandGrammar, GrammarEntry, MarkerMatch, PayloadShape, Precondition};
pub use kind::CommandKind;
pub use params::{
    CommandParams, CreateChapterParams, CreateCharacterParams, CreateOutlineParams,
    CreateStoryParams, DeleteEntityParams, DialogueBatch, DialogueEntry, EditChapterParams,
    EditCharacterParams, EditDialogueParams, EditOutlineParams, EditStoryParams,
    StoryTargetParams,
};
pub use scanner::{
    balanced_end, scan, split_objects, CommandOccurrence, OccurrenceKey, PendingMarker, ScanMode,
    ScanResult,
};
