//! Command Guide - 模型提示
//!
//! 根据命令语法注册表生成系统提示，新增语法条目会自动出现在提示中。

use std::fmt::Write;

use crate::application::dispatch::TurnContext;
use crate::domain::command::{CommandGrammar, CommandKind, GrammarEntry, PayloadShape};

const PREAMBLE: &str = "You are a creative writing assistant that co-authors stories with the user.\n\
Reply in the user's language. When the user asks you to change the story, \
write a short natural-language answer first, then append one command per change.\n\
A command is a marker on its own followed by JSON. Never wrap commands in code fences \
and never mention a marker in prose.";

/// 生成系统提示
pub fn system_prompt(grammar: &CommandGrammar, context: &TurnContext) -> String {
    let mut out = String::from(PREAMBLE);
    out.push_str("\n\n## Commands\n");

    for entry in grammar.entries() {
        render_entry(&mut out, entry);
    }

    out.push_str("\n## Context\n");
    match context.active_story {
        Some(id) => {
            let _ = writeln!(out, "The active story is {}.", id);
        }
        None => match grammar.entry(CommandKind::CreateStory) {
            Some(create) => {
                let _ = writeln!(
                    out,
                    "No story is selected. Commands that require an active story will fail \
                     until `{}` runs or the user selects a story.",
                    create.marker
                );
            }
            None => {
                out.push_str(
                    "No story is selected. Commands that require an active story will fail \
                     until the user selects a story.\n",
                );
            }
        },
    }

    out
}

fn render_entry(out: &mut String, entry: &GrammarEntry) {
    let _ = write!(out, "- `{}` {}", entry.marker, entry.summary);

    let payload = match entry.shape {
        PayloadShape::SingleObject => "one JSON object",
        PayloadShape::ObjectRun => "one JSON object per line, terminated by a blank line",
    };
    let _ = write!(out, "; payload: {}", payload);

    if !entry.required_fields.is_empty() {
        let _ = write!(out, "; required: {}", entry.required_fields.join(", "));
    }
    if !entry.optional_fields.is_empty() {
        let _ = write!(out, "; optional: {}", entry.optional_fields.join(", "));
    }
    for precondition in &entry.preconditions {
        let _ = write!(out, "; {}", precondition.describe());
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::story::EntityId;

    #[test]
    fn test_every_marker_documented() {
        let grammar = CommandGrammar::default();
        let prompt = system_prompt(&grammar, &TurnContext::new("s", None));

        for kind in CommandKind::ALL {
            assert!(prompt.contains(&kind.marker()), "missing {}", kind);
        }
        assert!(prompt.contains("until `/create-story` runs"));
        assert!(prompt.contains("terminated by a blank line"));
    }

    #[test]
    fn test_active_story_in_context() {
        let grammar = CommandGrammar::default();
        let prompt = system_prompt(&grammar, &TurnContext::new("s", Some(EntityId::new(42))));
        assert!(prompt.contains("The active story is 42."));
    }

    #[test]
    fn test_registered_entry_documented() {
        let mut grammar = CommandGrammar::empty();
        grammar.register(
            GrammarEntry::new(
                CommandKind::PublishStory,
                PayloadShape::SingleObject,
                "Publish it",
            )
            .fields(&["story_id"], &[]),
        );
        let prompt = system_prompt(&grammar, &TurnContext::default());
        assert!(prompt.contains("- `/publish-story` Publish it; payload: one JSON object; required: story_id"));
        assert!(!prompt.contains("/create-story"));
        assert!(prompt.contains("until the user selects a story"));
    }
}
