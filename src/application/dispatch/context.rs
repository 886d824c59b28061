//! Turn Context - 回合上下文
//!
//! 显式传入流水线的请求级状态，取代全局可变状态。
//! 回合开始时从会话复制，回合结束后由会话采纳。

use serde::Serialize;

use crate::application::ports::HandlerOutcome;
use crate::domain::command::{CommandError, CommandParams, Precondition};
use crate::domain::story::EntityId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnContext {
    pub session_id: String,
    /// 当前选中的故事
    pub active_story: Option<EntityId>,
}

impl TurnContext {
    pub fn new(session_id: impl Into<String>, active_story: Option<EntityId>) -> Self {
        Self {
            session_id: session_id.into(),
            active_story,
        }
    }

    /// 命令的目标故事：参数中显式指定的优先，否则为当前选中的故事
    pub fn story_target(&self, params: &CommandParams) -> Option<EntityId> {
        params.story_id().or(self.active_story)
    }

    /// 检查单个前置条件
    pub fn check(&self, precondition: Precondition, params: &CommandParams) -> Result<(), CommandError> {
        let satisfied = match precondition {
            Precondition::ActiveStory => self.active_story.is_some(),
            Precondition::StoryTarget => self.story_target(params).is_some(),
        };
        if satisfied {
            Ok(())
        } else {
            Err(CommandError::PreconditionUnmet(precondition))
        }
    }

    /// 应用处理器结果
    pub fn apply(&mut self, outcome: HandlerOutcome) {
        match outcome {
            HandlerOutcome::Done => {}
            HandlerOutcome::SelectStory(id) => self.active_story = Some(id),
            HandlerOutcome::StoryRemoved(id) => {
                if self.active_story == Some(id) {
                    self.active_story = None;
                }
            }
        }
    }
}
