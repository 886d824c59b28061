//! Story Command Handlers - 命令副作用
//!
//! 每个实体家族一个处理器，把解码后的命令参数落到实体存储。
//! 除故事本身外，所有实体都必须属于当前选中的故事。

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::dispatch::TurnContext;
use crate::application::ports::{
    CommandHandlerPort, EntityRecord, EntityRepositoryPort, HandlerError, HandlerOutcome,
    HandlerRegistry, NewEntity,
};
use crate::domain::command::{CommandKind, CommandParams, DialogueBatch, EditDialogueParams};
use crate::domain::story::{EntityId, EntityKind, StoryStatus};

/// 构建标准处理器注册表（覆盖全部命令种类）
pub fn standard_registry(repo: Arc<dyn EntityRepositoryPort>) -> HandlerRegistry {
    use CommandKind::*;

    let mut registry = HandlerRegistry::new();
    registry.register_all(
        &[CreateStory, EditStory, DeleteStory, PublishStory],
        Arc::new(StoryHandler::new(repo.clone())),
    );
    registry.register_all(
        &[CreateCharacter, EditCharacter, DeleteCharacter],
        Arc::new(CharacterHandler::new(repo.clone())),
    );
    registry.register_all(
        &[CreateChapter, EditChapter, DeleteChapter],
        Arc::new(ChapterHandler::new(repo.clone())),
    );
    registry.register_all(
        &[CreateOutline, EditOutline, DeleteOutline],
        Arc::new(OutlineHandler::new(repo.clone())),
    );
    registry.register_all(
        &[CreateDialogue, EditDialogue, DeleteDialogue],
        Arc::new(DialogueHandler::new(repo)),
    );
    registry
}

// ============================================================================
// Helpers
// ============================================================================

/// 仅在值存在时写入属性
fn put<T: Into<Value>>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.into());
    }
}

fn id_value(id: EntityId) -> Value {
    Value::from(id.value())
}

fn active_story(context: &TurnContext) -> Result<EntityId, HandlerError> {
    context
        .active_story
        .ok_or_else(|| HandlerError::rejected("no active story"))
}

fn unexpected(params: &CommandParams) -> HandlerError {
    HandlerError::Internal(format!("unexpected command: {}", params.kind()))
}

/// 读取属于指定故事的实体
async fn load_owned(
    repo: &dyn EntityRepositoryPort,
    kind: EntityKind,
    id: EntityId,
    story_id: EntityId,
) -> Result<EntityRecord, HandlerError> {
    let record = repo
        .find(kind, id)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("{} {}", kind, id)))?;
    if record.story_id != Some(story_id) {
        return Err(HandlerError::rejected(format!(
            "{} {} does not belong to story {}",
            kind, id, story_id
        )));
    }
    Ok(record)
}

async fn require_story(repo: &dyn EntityRepositoryPort, id: EntityId) -> Result<EntityRecord, HandlerError> {
    repo.find(EntityKind::Story, id)
        .await?
        .ok_or_else(|| HandlerError::not_found(format!("story {}", id)))
}

// ============================================================================
// Story
// ============================================================================

pub struct StoryHandler {
    repo: Arc<dyn EntityRepositoryPort>,
}

impl StoryHandler {
    pub fn new(repo: Arc<dyn EntityRepositoryPort>) -> Self {
        Self { repo }
    }

    fn target(params: &CommandParams, context: &TurnContext) -> Result<EntityId, HandlerError> {
        context
            .story_target(params)
            .ok_or_else(|| HandlerError::rejected("no target story"))
    }
}

#[async_trait]
impl CommandHandlerPort for StoryHandler {
    async fn handle(
        &self,
        params: &CommandParams,
        context: &TurnContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        match params {
            CommandParams::CreateStory(p) => {
                let mut attributes = Map::new();
                attributes.insert("title".into(), p.title.trim().into());
                put(&mut attributes, "description", p.description.clone());
                put(&mut attributes, "main_category", p.main_category.clone());
                attributes.insert("tags".into(), p.suggested_tags.clone().into());
                attributes.insert("status".into(), StoryStatus::Draft.as_str().into());

                let record = self
                    .repo
                    .insert(NewEntity::new(EntityKind::Story, attributes))
                    .await?;
                tracing::info!(story_id = %record.id, title = %p.title, "Story created");
                Ok(HandlerOutcome::SelectStory(record.id))
            }
            CommandParams::EditStory(p) => {
                let story_id = Self::target(params, context)?;
                require_story(self.repo.as_ref(), story_id).await?;

                let mut patch = Map::new();
                put(&mut patch, "title", p.title.clone());
                put(&mut patch, "description", p.description.clone());
                put(&mut patch, "main_category", p.main_category.clone());
                put(&mut patch, "tags", p.tags.clone());
                self.repo.update(EntityKind::Story, story_id, patch).await?;
                Ok(HandlerOutcome::Done)
            }
            CommandParams::DeleteStory(_) => {
                let story_id = Self::target(params, context)?;
                require_story(self.repo.as_ref(), story_id).await?;
                self.repo.delete(EntityKind::Story, story_id).await?;
                tracing::info!(story_id = %story_id, "Story deleted");
                Ok(HandlerOutcome::StoryRemoved(story_id))
            }
            CommandParams::PublishStory(_) => {
                let story_id = Self::target(params, context)?;
                let story = require_story(self.repo.as_ref(), story_id).await?;
                if story.attr_str("status") == Some(StoryStatus::Published.as_str()) {
                    return Err(HandlerError::rejected(format!(
                        "story {} is already published",
                        story_id
                    )));
                }

                let mut patch = Map::new();
                patch.insert("status".into(), StoryStatus::Published.as_str().into());
                self.repo.update(EntityKind::Story, story_id, patch).await?;
                tracing::info!(story_id = %story_id, "Story published");
                Ok(HandlerOutcome::Done)
            }
            other => Err(unexpected(other)),
        }
    }
}

// ============================================================================
// Character
// ============================================================================

pub struct CharacterHandler {
    repo: Arc<dyn EntityRepositoryPort>,
}

impl CharacterHandler {
    pub fn new(repo: Arc<dyn EntityRepositoryPort>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CommandHandlerPort for CharacterHandler {
    async fn handle(
        &self,
        params: &CommandParams,
        context: &TurnContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let story_id = active_story(context)?;

        match params {
            CommandParams::CreateCharacter(p) => {
                let mut attributes = p.extra.clone();
                attributes.insert("name".into(), p.name.trim().into());
                put(&mut attributes, "description", p.description.clone());
                put(&mut attributes, "personality", p.personality.clone());
                put(&mut attributes, "appearance", p.appearance.clone());
                put(&mut attributes, "role", p.role.clone());

                let record = self
                    .repo
                    .insert(NewEntity::new(EntityKind::Character, attributes).in_story(story_id))
                    .await?;
                tracing::debug!(story_id = %story_id, character_id = %record.id, "Character created");
                Ok(HandlerOutcome::Done)
            }
            CommandParams::EditCharacter(p) => {
                load_owned(self.repo.as_ref(), EntityKind::Character, p.id, story_id).await?;

                let mut patch = p.extra.clone();
                put(&mut patch, "name", p.name.clone());
                put(&mut patch, "description", p.description.clone());
                put(&mut patch, "personality", p.personality.clone());
                put(&mut patch, "appearance", p.appearance.clone());
                put(&mut patch, "role", p.role.clone());
                self.repo.update(EntityKind::Character, p.id, patch).await?;
                Ok(HandlerOutcome::Done)
            }
            CommandParams::DeleteCharacter(p) => {
                load_owned(self.repo.as_ref(), EntityKind::Character, p.id, story_id).await?;
                self.repo.delete(EntityKind::Character, p.id).await?;
                Ok(HandlerOutcome::Done)
            }
            other => Err(unexpected(other)),
        }
    }
}

// ============================================================================
// Chapter
// ============================================================================

pub struct ChapterHandler {
    repo: Arc<dyn EntityRepositoryPort>,
}

impl ChapterHandler {
    pub fn new(repo: Arc<dyn EntityRepositoryPort>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CommandHandlerPort for ChapterHandler {
    async fn handle(
        &self,
        params: &CommandParams,
        context: &TurnContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let story_id = active_story(context)?;

        match params {
            CommandParams::CreateChapter(p) => {
                // 未指定顺序时排在最后
                let order = match p.order {
                    Some(order) => order,
                    None => {
                        self.repo
                            .list(EntityKind::Chapter, Some(story_id))
                            .await?
                            .len() as i64
                            + 1
                    }
                };

                let mut attributes = Map::new();
                attributes.insert("title".into(), p.title.trim().into());
                put(&mut attributes, "content", p.content.clone());
                attributes.insert("order".into(), order.into());

                let record = self
                    .repo
                    .insert(NewEntity::new(EntityKind::Chapter, attributes).in_story(story_id))
                    .await?;
                tracing::debug!(story_id = %story_id, chapter_id = %record.id, "Chapter created");
                Ok(HandlerOutcome::Done)
            }
            CommandParams::EditChapter(p) => {
                load_owned(self.repo.as_ref(), EntityKind::Chapter, p.id, story_id).await?;

                let mut patch = Map::new();
                put(&mut patch, "title", p.title.clone());
                put(&mut patch, "content", p.content.clone());
                put(&mut patch, "order", p.order);
                self.repo.update(EntityKind::Chapter, p.id, patch).await?;
                Ok(HandlerOutcome::Done)
            }
            CommandParams::DeleteChapter(p) => {
                load_owned(self.repo.as_ref(), EntityKind::Chapter, p.id, story_id).await?;
                self.repo.delete(EntityKind::Chapter, p.id).await?;
                Ok(HandlerOutcome::Done)
            }
            other => Err(unexpected(other)),
        }
    }
}

// ============================================================================
// Outline
// ============================================================================

pub struct OutlineHandler {
    repo: Arc<dyn EntityRepositoryPort>,
}

impl OutlineHandler {
    pub fn new(repo: Arc<dyn EntityRepositoryPort>) -> Self {
        Self { repo }
    }

    async fn check_chapter(
        &self,
        chapter_id: Option<EntityId>,
        story_id: EntityId,
    ) -> Result<(), HandlerError> {
        if let Some(chapter_id) = chapter_id {
            load_owned(self.repo.as_ref(), EntityKind::Chapter, chapter_id, story_id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandlerPort for OutlineHandler {
    async fn handle(
        &self,
        params: &CommandParams,
        context: &TurnContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let story_id = active_story(context)?;

        match params {
            CommandParams::CreateOutline(p) => {
                self.check_chapter(p.chapter_id, story_id).await?;

                let mut attributes = Map::new();
                attributes.insert("title".into(), p.title.trim().into());
                put(&mut attributes, "content", p.content.clone());
                put(&mut attributes, "order", p.order);

                self.repo
                    .insert(
                        NewEntity::new(EntityKind::Outline, attributes)
                            .in_story(story_id)
                            .with_parent(p.chapter_id),
                    )
                    .await?;
                Ok(HandlerOutcome::Done)
            }
            CommandParams::EditOutline(p) => {
                load_owned(self.repo.as_ref(), EntityKind::Outline, p.id, story_id).await?;
                self.check_chapter(p.chapter_id, story_id).await?;

                let mut patch = Map::new();
                put(&mut patch, "title", p.title.clone());
                put(&mut patch, "content", p.content.clone());
                put(&mut patch, "order", p.order);
                put(&mut patch, "chapter_id", p.chapter_id.map(id_value));
                self.repo.update(EntityKind::Outline, p.id, patch).await?;
                Ok(HandlerOutcome::Done)
            }
            CommandParams::DeleteOutline(p) => {
                load_owned(self.repo.as_ref(), EntityKind::Outline, p.id, story_id).await?;
                self.repo.delete(EntityKind::Outline, p.id).await?;
                Ok(HandlerOutcome::Done)
            }
            other => Err(unexpected(other)),
        }
    }
}

// ============================================================================
// Dialogue
// ============================================================================

pub struct DialogueHandler {
    repo: Arc<dyn EntityRepositoryPort>,
}

impl DialogueHandler {
    pub fn new(repo: Arc<dyn EntityRepositoryPort>) -> Self {
        Self { repo }
    }

    /// 当前故事的角色名 -> id（名称不区分大小写）
    ///
    /// 在处理时读取，同一回合中先执行的 `create-character` 已经可见。
    async fn character_index(
        &self,
        story_id: EntityId,
    ) -> Result<HashMap<String, EntityId>, HandlerError> {
        let characters = self
            .repo
            .list(EntityKind::Character, Some(story_id))
            .await?;
        Ok(characters
            .into_iter()
            .filter_map(|c| {
                c.attr_str("name")
                    .map(|name| (name.trim().to_lowercase(), c.id))
            })
            .collect())
    }

    /// 解析说话的角色：显式 id 优先，否则按名称匹配
    fn resolve_speaker(
        index: &HashMap<String, EntityId>,
        character_id: Option<EntityId>,
        character_name: Option<&str>,
    ) -> Option<EntityId> {
        character_id.or_else(|| {
            character_name.and_then(|name| index.get(&name.trim().to_lowercase()).copied())
        })
    }

    async fn create_batch(
        &self,
        batch: &DialogueBatch,
        story_id: EntityId,
    ) -> Result<HandlerOutcome, HandlerError> {
        load_owned(self.repo.as_ref(), EntityKind::Chapter, batch.chapter_id, story_id).await?;

        let index = self.character_index(story_id).await?;
        let existing = self
            .repo
            .list(EntityKind::Dialogue, Some(story_id))
            .await?
            .into_iter()
            .filter(|d| d.parent_id == Some(batch.chapter_id))
            .count() as i64;

        let mut entities = Vec::with_capacity(batch.entries.len());
        for (i, entry) in batch.entries.iter().enumerate() {
            let speaker =
                Self::resolve_speaker(&index, entry.character_id, entry.character_name.as_deref());
            if speaker.is_none() {
                if let Some(name) = &entry.character_name {
                    tracing::warn!(
                        story_id = %story_id,
                        character_name = %name,
                        "Dialogue speaker not found, keeping name only"
                    );
                }
            }

            let mut attributes = Map::new();
            attributes.insert("content".into(), entry.content.clone().into());
            attributes.insert("type".into(), entry.dialogue_type.as_str().into());
            attributes.insert("order".into(), (existing + i as i64 + 1).into());
            put(&mut attributes, "character_id", speaker.map(id_value));
            put(&mut attributes, "character_name", entry.character_name.clone());

            entities.push(
                NewEntity::new(EntityKind::Dialogue, attributes)
                    .in_story(story_id)
                    .with_parent(Some(batch.chapter_id)),
            );
        }

        let created = self.repo.insert_batch(entities).await?;
        tracing::info!(
            story_id = %story_id,
            chapter_id = %batch.chapter_id,
            created = created.len(),
            skipped = batch.skipped,
            "Dialogue batch created"
        );
        Ok(HandlerOutcome::Done)
    }

    async fn edit(&self, p: &EditDialogueParams, story_id: EntityId) -> Result<HandlerOutcome, HandlerError> {
        load_owned(self.repo.as_ref(), EntityKind::Dialogue, p.id, story_id).await?;

        let mut patch = Map::new();
        put(&mut patch, "content", p.content.clone());
        put(&mut patch, "type", p.dialogue_type.map(|t| t.as_str()));
        if p.character_id.is_some() || p.character_name.is_some() {
            let index = self.character_index(story_id).await?;
            let speaker =
                Self::resolve_speaker(&index, p.character_id, p.character_name.as_deref());
            patch.insert(
                "character_id".into(),
                speaker.map(id_value).unwrap_or(Value::Null),
            );
            put(&mut patch, "character_name", p.character_name.clone());
        }
        self.repo.update(EntityKind::Dialogue, p.id, patch).await?;
        Ok(HandlerOutcome::Done)
    }
}

#[async_trait]
impl CommandHandlerPort for DialogueHandler {
    async fn handle(
        &self,
        params: &CommandParams,
        context: &TurnContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let story_id = active_story(context)?;

        match params {
            CommandParams::CreateDialogue(batch) => self.create_batch(batch, story_id).await,
            CommandParams::EditDialogue(p) => self.edit(p, story_id).await,
            CommandParams::DeleteDialogue(p) => {
                load_owned(self.repo.as_ref(), EntityKind::Dialogue, p.id, story_id).await?;
                self.repo.delete(EntityKind::Dialogue, p.id).await?;
                Ok(HandlerOutcome::Done)
            }
            other => Err(unexpected(other)),
        }
    }
}
