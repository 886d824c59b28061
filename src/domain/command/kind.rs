//! Command Context - 命令种类

use serde::{Deserialize, Serialize};

/// 命令种类
///
/// 每种命令对应一个固定的参数结构和一个文本标记（`/<kind-name>`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    CreateStory,
    EditStory,
    DeleteStory,
    PublishStory,
    CreateCharacter,
    EditCharacter,
    DeleteCharacter,
    CreateChapter,
    EditChapter,
    DeleteChapter,
    CreateOutline,
    EditOutline,
    DeleteOutline,
    /// 批量创建对白（一串 JSON 对象）
    CreateDialogue,
    EditDialogue,
    DeleteDialogue,
}

impl CommandKind {
    pub const ALL: [CommandKind; 16] = [
        CommandKind::CreateStory,
        CommandKind::EditStory,
        CommandKind::DeleteStory,
        CommandKind::PublishStory,
        CommandKind::CreateCharacter,
        CommandKind::EditCharacter,
        CommandKind::DeleteCharacter,
        CommandKind::CreateChapter,
        CommandKind::EditChapter,
        CommandKind::DeleteChapter,
        CommandKind::CreateOutline,
        CommandKind::EditOutline,
        CommandKind::DeleteOutline,
        CommandKind::CreateDialogue,
        CommandKind::EditDialogue,
        CommandKind::DeleteDialogue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::CreateStory => "create-story",
            CommandKind::EditStory => "edit-story",
            CommandKind::DeleteStory => "delete-story",
            CommandKind::PublishStory => "publish-story",
            CommandKind::CreateCharacter => "create-character",
            CommandKind::EditCharacter => "edit-character",
            CommandKind::DeleteCharacter => "delete-character",
            CommandKind::CreateChapter => "create-chapter",
            CommandKind::EditChapter => "edit-chapter",
            CommandKind::DeleteChapter => "delete-chapter",
            CommandKind::CreateOutline => "create-outline",
            CommandKind::EditOutline => "edit-outline",
            CommandKind::DeleteOutline => "delete-outline",
            CommandKind::CreateDialogue => "create-dialogue",
            CommandKind::EditDialogue => "edit-dialogue",
            CommandKind::DeleteDialogue => "delete-dialogue",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }

    /// 文本中的命令标记，例如 `/create-story`
    pub fn marker(&self) -> String {
        format!("/{}", self.as_str())
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
