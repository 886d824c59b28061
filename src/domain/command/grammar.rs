//! Command Grammar - 命令语法注册表
//!
//! 负责把文本标记（如 `/create-character`）映射到：
//! - 载荷形态：单个 JSON 对象，或一串 JSON 对象（仅 `create-dialogue`）
//! - 分发前置条件（如"需要已选中的故事"）
//!
//! 扫描器和分发协调器只依赖本注册表，新增命令种类不需要改动它们。

use serde::Serialize;

use super::CommandKind;

/// 载荷形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// 标记后紧跟一个 JSON 对象
    SingleObject,
    /// 标记后跟一串以空白分隔的 JSON 对象，以空行或输入结束为止
    ObjectRun,
}

/// 分发前置条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// 需要当前回合存在已选中的故事
    ActiveStory,
    /// 需要目标故事：参数中的 `story_id` 或已选中的故事
    StoryTarget,
}

impl Precondition {
    pub fn describe(&self) -> &'static str {
        match self {
            Precondition::ActiveStory => "requires an active story selection",
            Precondition::StoryTarget => "targets `story_id` or the active story",
        }
    }
}

/// 语法条目
#[derive(Debug, Clone, Serialize)]
pub struct GrammarEntry {
    pub kind: CommandKind,
    pub marker: String,
    pub shape: PayloadShape,
    pub preconditions: Vec<Precondition>,
    /// 必填字段（用于生成模型提示）
    pub required_fields: &'static [&'static str],
    /// 可选字段（用于生成模型提示）
    pub optional_fields: &'static [&'static str],
    pub summary: &'static str,
}

impl GrammarEntry {
    pub fn new(kind: CommandKind, shape: PayloadShape, summary: &'static str) -> Self {
        Self {
            kind,
            marker: kind.marker(),
            shape,
            preconditions: Vec::new(),
            required_fields: &[],
            optional_fields: &[],
            summary,
        }
    }

    pub fn requires(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn fields(
        mut self,
        required: &'static [&'static str],
        optional: &'static [&'static str],
    ) -> Self {
        self.required_fields = required;
        self.optional_fields = optional;
        self
    }
}

/// 命令语法注册表
#[derive(Debug, Clone)]
pub struct CommandGrammar {
    entries: Vec<GrammarEntry>,
}

impl CommandGrammar {
    /// 空注册表
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// 注册一个条目，同种类的旧条目会被替换
    pub fn register(&mut self, entry: GrammarEntry) {
        self.entries.retain(|e| e.kind != entry.kind);
        self.entries.push(entry);
        // 长标记优先，保证前缀相同时匹配最长的标记
        self.entries
            .sort_by(|a, b| b.marker.len().cmp(&a.marker.len()).then(a.kind.cmp(&b.kind)));
    }

    /// 按标记查找条目
    pub fn lookup(&self, marker: &str) -> Option<&GrammarEntry> {
        self.entries.iter().find(|e| e.marker == marker)
    }

    /// 按种类查找条目
    pub fn entry(&self, kind: CommandKind) -> Option<&GrammarEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    /// 所有条目（按种类排序，便于展示）
    pub fn entries(&self) -> Vec<&GrammarEntry> {
        let mut entries: Vec<&GrammarEntry> = self.entries.iter().collect();
        entries.sort_by_key(|e| e.kind);
        entries
    }

    /// 在 `text[at..]` 处匹配一个标记
    ///
    /// 标记前一个字符不能是单词字符，标记后必须是空白或 `{`/`[`。
    /// 标记正好位于文本末尾时返回 `MarkerMatch::Partial`（后续片段可能改变其含义）。
    pub fn match_marker(&self, text: &str, at: usize) -> MarkerMatch<'_> {
        let rest = &text[at..];
        if !rest.starts_with('/') {
            return MarkerMatch::None;
        }
        if let Some(prev) = text[..at].chars().next_back() {
            if is_word_char(prev) || prev == '/' {
                return MarkerMatch::None;
            }
        }

        for entry in &self.entries {
            if !rest.starts_with(entry.marker.as_str()) {
                continue;
            }
            match rest[entry.marker.len()..].chars().next() {
                None => return MarkerMatch::Partial(entry),
                Some(c) if c.is_whitespace() || c == '{' || c == '[' => {
                    return MarkerMatch::Found(entry)
                }
                Some(_) => continue,
            }
        }
        MarkerMatch::None
    }

    /// `text` 的结尾是否可能是某个标记的前缀（例如 `"...好的 /crea"`）
    pub fn trailing_marker_prefix(&self, text: &str) -> Option<usize> {
        let slash = text.rfind('/')?;
        let tail = &text[slash..];
        if let Some(prev) = text[..slash].chars().next_back() {
            if is_word_char(prev) {
                return None;
            }
        }
        self.entries
            .iter()
            .any(|e| e.marker.starts_with(tail))
            .then_some(slash)
    }
}

impl Default for CommandGrammar {
    /// 标准命令集
    fn default() -> Self {
        use CommandKind::*;
        use PayloadShape::*;
        use Precondition::*;

        let mut grammar = Self::empty();
        let entries = [
            GrammarEntry::new(CreateStory, SingleObject, "Create a new story and select it")
                .fields(&["title"], &["description", "mainCategory", "suggestedTags"]),
            GrammarEntry::new(EditStory, SingleObject, "Edit story attributes")
                .requires(StoryTarget)
                .fields(&[], &["story_id", "title", "description", "mainCategory", "tags"]),
            GrammarEntry::new(DeleteStory, SingleObject, "Delete a story")
                .requires(StoryTarget)
                .fields(&[], &["story_id"]),
            GrammarEntry::new(PublishStory, SingleObject, "Publish a story")
                .requires(StoryTarget)
                .fields(&[], &["story_id"]),
            GrammarEntry::new(CreateCharacter, SingleObject, "Create a character in the active story")
                .requires(ActiveStory)
                .fields(&["name"], &["description", "personality", "appearance", "role"]),
            GrammarEntry::new(EditCharacter, SingleObject, "Edit a character")
                .requires(ActiveStory)
                .fields(&["id"], &["name", "description", "personality", "appearance", "role"]),
            GrammarEntry::new(DeleteCharacter, SingleObject, "Delete a character")
                .requires(ActiveStory)
                .fields(&["id"], &[]),
            GrammarEntry::new(CreateChapter, SingleObject, "Create a chapter in the active story")
                .requires(ActiveStory)
                .fields(&["title"], &["content", "order"]),
            GrammarEntry::new(EditChapter, SingleObject, "Edit a chapter")
                .requires(ActiveStory)
                .fields(&["id"], &["title", "content", "order"]),
            GrammarEntry::new(DeleteChapter, SingleObject, "Delete a chapter")
                .requires(ActiveStory)
                .fields(&["id"], &[]),
            GrammarEntry::new(CreateOutline, SingleObject, "Create an outline entry in the active story")
                .requires(ActiveStory)
                .fields(&["title"], &["content", "chapter_id", "order"]),
            GrammarEntry::new(EditOutline, SingleObject, "Edit an outline entry")
                .requires(ActiveStory)
                .fields(&["id"], &["title", "content", "chapter_id", "order"]),
            GrammarEntry::new(DeleteOutline, SingleObject, "Delete an outline entry")
                .requires(ActiveStory)
                .fields(&["id"], &[]),
            GrammarEntry::new(
                CreateDialogue,
                ObjectRun,
                "Create dialogue lines, one JSON object per line, end with a blank line",
            )
            .requires(ActiveStory)
            .fields(
                &["chapter_id", "content", "type"],
                &["character_id", "character_name"],
            ),
            GrammarEntry::new(EditDialogue, SingleObject, "Edit a dialogue line")
                .requires(ActiveStory)
                .fields(&["id"], &["content", "type", "character_id", "character_name"]),
            GrammarEntry::new(DeleteDialogue, SingleObject, "Delete a dialogue line")
                .requires(ActiveStory)
                .fields(&["id"], &[]),
        ];
        for entry in entries {
            grammar.register(entry);
        }
        grammar
    }
}

/// 标记匹配结果
#[derive(Debug, Clone, Copy)]
pub enum MarkerMatch<'a> {
    None,
    /// 标记位于文本末尾，尚无法确定
    Partial(&'a GrammarEntry),
    Found(&'a GrammarEntry),
}

#[inline]
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grammar_covers_all_kinds() {
        let grammar = CommandGrammar::default();
        for kind in CommandKind::ALL {
            let entry = grammar.entry(kind).expect("entry registered");
            assert_eq!(entry.marker, kind.marker());
        }
        assert_eq!(grammar.entries().len(), CommandKind::ALL.len());
    }

    #[test]
    fn test_lookup() {
        let grammar = CommandGrammar::default();
        let entry = grammar.lookup("/create-dialogue").unwrap();
        assert_eq!(entry.shape, PayloadShape::ObjectRun);
        assert!(grammar.lookup("/create-poem").is_none());
    }

    #[test]
    fn test_dialogue_and_character_require_active_story() {
        let grammar = CommandGrammar::default();
        assert!(grammar
            .entry(CommandKind::CreateCharacter)
            .unwrap()
            .preconditions
            .contains(&Precondition::ActiveStory));
        assert!(grammar
            .entry(CommandKind::CreateStory)
            .unwrap()
            .preconditions
            .is_empty());
    }

    #[test]
    fn test_match_marker_boundaries() {
        let grammar = CommandGrammar::default();
        let text = "ok /create-story {}";
        assert!(matches!(grammar.match_marker(text, 3), MarkerMatch::Found(_)));

        // 前面紧跟单词字符
        let text = "path/create-story {}";
        assert!(matches!(grammar.match_marker(text, 4), MarkerMatch::None));

        // 后面紧跟单词字符
        let text = "/create-storyline {}";
        assert!(matches!(grammar.match_marker(text, 0), MarkerMatch::None));

        // 位于末尾
        let text = "ok /create-story";
        assert!(matches!(grammar.match_marker(text, 3), MarkerMatch::Partial(_)));
    }

    #[test]
    fn test_trailing_marker_prefix() {
        let grammar = CommandGrammar::default();
        assert_eq!(grammar.trailing_marker_prefix("Xong /crea"), Some(5));
        assert_eq!(grammar.trailing_marker_prefix("Xong /"), Some(5));
        assert_eq!(grammar.trailing_marker_prefix("a/b"), None);
        assert_eq!(grammar.trailing_marker_prefix("1 /2"), None);
    }

    #[test]
    fn test_register_replaces_entry() {
        let mut grammar = CommandGrammar::default();
        grammar.register(GrammarEntry::new(
            CommandKind::CreateStory,
            PayloadShape::SingleObject,
            "custom",
        ));
        assert_eq!(grammar.entry(CommandKind::CreateStory).unwrap().summary, "custom");
        assert_eq!(grammar.entries().len(), CommandKind::ALL.len());
    }
}
