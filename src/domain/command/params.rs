//! Command Context - 各命令的参数结构
//!
//! 字段命名跟随模型的实际输出：故事相关字段为 camelCase（`mainCategory`），
//! 其余为 snake_case（`chapter_id`），两种写法都通过 alias 接受。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::CommandKind;
use crate::domain::story::{DialogueType, EntityId};

// ============================================================================
// Story
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryParams {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "main_category", alias = "category")]
    pub main_category: Option<String>,
    #[serde(default, alias = "suggested_tags", alias = "tags")]
    pub suggested_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditStoryParams {
    #[serde(default, alias = "story_id")]
    pub story_id: Option<EntityId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "main_category", alias = "category")]
    pub main_category: Option<String>,
    #[serde(default, alias = "suggestedTags", alias = "suggested_tags")]
    pub tags: Option<Vec<String>>,
}

/// `delete-story` / `publish-story`：目标故事缺省为当前选中的故事
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryTargetParams {
    #[serde(default, alias = "story_id")]
    pub story_id: Option<EntityId>,
}

// ============================================================================
// Character
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCharacterParams {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub appearance: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// 其余字段原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditCharacterParams {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub appearance: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Chapter / Outline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChapterParams {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditChapterParams {
    pub id: EntityId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOutlineParams {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "chapterId")]
    pub chapter_id: Option<EntityId>,
    #[serde(default)]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOutlineParams {
    pub id: EntityId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "chapterId")]
    pub chapter_id: Option<EntityId>,
    #[serde(default)]
    pub order: Option<i64>,
}

// ============================================================================
// Dialogue
// ============================================================================

/// `create-dialogue` 的单个条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueEntry {
    #[serde(default, alias = "chapterId")]
    pub chapter_id: Option<EntityId>,
    pub content: String,
    #[serde(rename = "type")]
    pub dialogue_type: DialogueType,
    #[serde(default, alias = "characterId")]
    pub character_id: Option<EntityId>,
    #[serde(default, alias = "characterName", alias = "character")]
    pub character_name: Option<String>,
}

/// `create-dialogue` 解码后的批次
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogueBatch {
    /// 取自第一个有效条目
    pub chapter_id: EntityId,
    pub entries: Vec<DialogueEntry>,
    /// 被跳过的坏条目数量
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditDialogueParams {
    pub id: EntityId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub dialogue_type: Option<DialogueType>,
    #[serde(default, alias = "characterId")]
    pub character_id: Option<EntityId>,
    #[serde(default, alias = "characterName", alias = "character")]
    pub character_name: Option<String>,
}

// ============================================================================
// Shared
// ============================================================================

/// 删除角色 / 章节 / 大纲 / 对白
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteEntityParams {
    pub id: EntityId,
}

/// 解码后的命令参数
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "params", rename_all = "kebab-case")]
pub enum CommandParams {
    CreateStory(CreateStoryParams),
    EditStory(EditStoryParams),
    DeleteStory(StoryTargetParams),
    PublishStory(StoryTargetParams),
    CreateCharacter(CreateCharacterParams),
    EditCharacter(EditCharacterParams),
    DeleteCharacter(DeleteEntityParams),
    CreateChapter(CreateChapterParams),
    EditChapter(EditChapterParams),
    DeleteChapter(DeleteEntityParams),
    CreateOutline(CreateOutlineParams),
    EditOutline(EditOutlineParams),
    DeleteOutline(DeleteEntityParams),
    CreateDialogue(DialogueBatch),
    EditDialogue(EditDialogueParams),
    DeleteDialogue(DeleteEntityParams),
}

impl CommandParams {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandParams::CreateStory(_) => CommandKind::CreateStory,
            CommandParams::EditStory(_) => CommandKind::EditStory,
            CommandParams::DeleteStory(_) => CommandKind::DeleteStory,
            CommandParams::PublishStory(_) => CommandKind::PublishStory,
            CommandParams::CreateCharacter(_) => CommandKind::CreateCharacter,
            CommandParams::EditCharacter(_) => CommandKind::EditCharacter,
            CommandParams::DeleteCharacter(_) => CommandKind::DeleteCharacter,
            CommandParams::CreateChapter(_) => CommandKind::CreateChapter,
            CommandParams::EditChapter(_) => CommandKind::EditChapter,
            CommandParams::DeleteChapter(_) => CommandKind::DeleteChapter,
            CommandParams::CreateOutline(_) => CommandKind::CreateOutline,
            CommandParams::EditOutline(_) => CommandKind::EditOutline,
            CommandParams::DeleteOutline(_) => CommandKind::DeleteOutline,
            CommandParams::CreateDialogue(_) => CommandKind::CreateDialogue,
            CommandParams::EditDialogue(_) => CommandKind::EditDialogue,
            CommandParams::DeleteDialogue(_) => CommandKind::DeleteDialogue,
        }
    }

    /// 参数中显式指定的目标故事
    pub fn story_id(&self) -> Option<EntityId> {
        match self {
            CommandParams::EditStory(p) => p.story_id,
            CommandParams::DeleteStory(p) | CommandParams::PublishStory(p) => p.story_id,
            _ => None,
        }
    }
}
