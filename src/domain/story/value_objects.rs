//! Story Context - Value Objects

use serde::{de, Deserialize, Deserializer, Serialize};

/// 实体唯一标识（由持久化层分配的自增整数）
///
/// 反序列化时同时接受数字和数字字符串，模型经常输出 `"12"`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(EntityId(n)),
            Raw::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(EntityId)
                .map_err(|_| de::Error::custom(format!("invalid entity id: {:?}", s))),
        }
    }
}

/// 实体种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Story,
    Character,
    Chapter,
    Outline,
    Dialogue,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Story => "story",
            EntityKind::Character => "character",
            EntityKind::Chapter => "chapter",
            EntityKind::Outline => "outline",
            EntityKind::Dialogue => "dialogue",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "story" => Some(EntityKind::Story),
            "character" => Some(EntityKind::Character),
            "chapter" => Some(EntityKind::Chapter),
            "outline" => Some(EntityKind::Outline),
            "dialogue" => Some(EntityKind::Dialogue),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对白类型：角色台词或旁白
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueType {
    Dialogue,
    Aside,
}

impl DialogueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueType::Dialogue => "dialogue",
            DialogueType::Aside => "aside",
        }
    }
}

/// 故事发布状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Draft,
    Published,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Draft => "draft",
            StoryStatus::Published => "published",
        }
    }
}
