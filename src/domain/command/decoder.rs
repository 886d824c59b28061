//! Payload Decoder - 载荷解码
//!
//! 把扫描出的原始 JSON 文本解码为各命令的强类型参数。
//! `create-dialogue` 的每个对象独立解码，坏条目跳过并告警，其余照常执行。

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::params::*;
use super::scanner::{split_objects, CommandOccurrence, OccurrenceKey};
use super::{CommandError, CommandKind};

/// 解码后的命令
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCommand {
    pub params: CommandParams,
    pub occurrence: CommandOccurrence,
}

impl DecodedCommand {
    pub fn kind(&self) -> CommandKind {
        self.occurrence.kind
    }

    pub fn key(&self) -> OccurrenceKey {
        self.occurrence.key()
    }
}

/// 解码一次命令出现
pub fn decode(occurrence: &CommandOccurrence) -> Result<DecodedCommand, CommandError> {
    let params = decode_payload(occurrence.kind, &occurrence.raw_payload)?;
    Ok(DecodedCommand {
        params,
        occurrence: occurrence.clone(),
    })
}

/// 按命令种类解码原始载荷文本
pub fn decode_payload(kind: CommandKind, raw: &str) -> Result<CommandParams, CommandError> {
    if kind == CommandKind::CreateDialogue {
        return decode_dialogue_batch(raw).map(CommandParams::CreateDialogue);
    }

    let mut value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| CommandError::MalformedJson(e.to_string()))?;
    if !value.is_object() {
        return Err(CommandError::InvalidParams(
            "payload must be a JSON object".to_string(),
        ));
    }
    normalize_target_id(kind, &mut value);

    let params = match kind {
        CommandKind::CreateStory => CommandParams::CreateStory(parse(value)?),
        CommandKind::EditStory => CommandParams::EditStory(parse(value)?),
        CommandKind::DeleteStory => CommandParams::DeleteStory(parse(value)?),
        CommandKind::PublishStory => CommandParams::PublishStory(parse(value)?),
        CommandKind::CreateCharacter => CommandParams::CreateCharacter(parse(value)?),
        CommandKind::EditCharacter => CommandParams::EditCharacter(parse(value)?),
        CommandKind::DeleteCharacter => CommandParams::DeleteCharacter(parse(value)?),
        CommandKind::CreateChapter => CommandParams::CreateChapter(parse(value)?),
        CommandKind::EditChapter => CommandParams::EditChapter(parse(value)?),
        CommandKind::DeleteChapter => CommandParams::DeleteChapter(parse(value)?),
        CommandKind::CreateOutline => CommandParams::CreateOutline(parse(value)?),
        CommandKind::EditOutline => CommandParams::EditOutline(parse(value)?),
        CommandKind::DeleteOutline => CommandParams::DeleteOutline(parse(value)?),
        CommandKind::EditDialogue => CommandParams::EditDialogue(parse(value)?),
        CommandKind::DeleteDialogue => CommandParams::DeleteDialogue(parse(value)?),
        CommandKind::CreateDialogue => unreachable!("handled above"),
    };

    validate(&params)?;
    Ok(params)
}

/// 解码对白批次
fn decode_dialogue_batch(raw: &str) -> Result<DialogueBatch, CommandError> {
    let raw = raw.trim();

    let items: Vec<Result<DialogueEntry, String>> = if raw.starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(raw).map_err(|e| CommandError::MalformedJson(e.to_string()))?;
        values.into_iter().map(parse_dialogue_entry).collect()
    } else {
        split_objects(raw)
            .into_iter()
            .map(|item| {
                serde_json::from_str::<Value>(item)
                    .map_err(|e| e.to_string())
                    .and_then(parse_dialogue_entry)
            })
            .collect()
    };

    let mut entries = Vec::new();
    let mut skipped = 0;
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Ok(entry) => entries.push(entry),
            Err(reason) => {
                skipped += 1;
                tracing::warn!(index = index, error = %reason, "Skipping malformed dialogue entry");
            }
        }
    }

    if entries.is_empty() {
        return Err(CommandError::EmptyBatch { skipped });
    }

    // 批次的章节取自第一条有效条目
    let chapter_id = entries[0]
        .chapter_id
        .ok_or(CommandError::MissingField("chapter_id"))?;

    Ok(DialogueBatch {
        chapter_id,
        entries,
        skipped,
    })
}

fn parse_dialogue_entry(value: Value) -> Result<DialogueEntry, String> {
    let entry: DialogueEntry = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if entry.content.trim().is_empty() {
        return Err("empty dialogue content".to_string());
    }
    Ok(entry)
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, CommandError> {
    serde_json::from_value(value).map_err(|e| CommandError::InvalidParams(e.to_string()))
}

/// 编辑/删除命令允许用 `character_id`、`chapterId` 等写法指定目标 id
fn normalize_target_id(kind: CommandKind, value: &mut Value) {
    let entity = match kind {
        CommandKind::EditCharacter | CommandKind::DeleteCharacter => "character",
        CommandKind::EditChapter | CommandKind::DeleteChapter => "chapter",
        CommandKind::EditOutline | CommandKind::DeleteOutline => "outline",
        CommandKind::EditDialogue | CommandKind::DeleteDialogue => "dialogue",
        _ => return,
    };

    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if obj.contains_key("id") {
        return;
    }
    for alias in [format!("{}_id", entity), format!("{}Id", entity)] {
        if let Some(id) = obj.remove(&alias) {
            obj.insert("id".to_string(), id);
            return;
        }
    }
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn validate(params: &CommandParams) -> Result<(), CommandError> {
    match params {
        CommandParams::CreateStory(p) if blank(&p.title) => Err(CommandError::MissingField("title")),
        CommandParams::CreateCharacter(p) if blank(&p.name) => {
            Err(CommandError::MissingField("name"))
        }
        CommandParams::CreateChapter(p) if blank(&p.title) => {
            Err(CommandError::MissingField("title"))
        }
        CommandParams::CreateOutline(p) if blank(&p.title) => {
            Err(CommandError::MissingField("title"))
        }
        _ => Ok(()),
    }
}
