//! Incremental Extractor - 增量命令扫描
//!
//! 每次收到新片段后对完整累积文本重新扫描，找出目前已完整的命令。
//!
//! 扫描策略：
//! 1. 从左到右查找命令标记
//! 2. 标记后用括号深度 + 字符串转义跟踪匹配平衡的 JSON 值（不使用正则）
//! 3. 已完整命令的载荷整体跳过，载荷字符串里出现的标记不会被误认为命令
//! 4. 遇到尚未完整的载荷即停止，其后的所有文本都属于这个载荷
//!
//! 同一命令在更长的累积文本上重新扫描时，报告的区间 `[start, end)` 保持不变。

use serde::Serialize;

use super::grammar::{CommandGrammar, MarkerMatch, PayloadShape};
use super::CommandKind;

/// 扫描模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// 流仍在继续：以输入结束收尾的对象串尚不完整
    Streaming,
    /// 流已结束：输入结束即为对象串的终止
    Final,
}

/// 命令出现位置的稳定标识（种类 + 标记起始偏移）
///
/// 排序按偏移优先，即标记在文本中的出现顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OccurrenceKey {
    pub offset: usize,
    pub kind: CommandKind,
}

impl OccurrenceKey {
    pub fn new(kind: CommandKind, offset: usize) -> Self {
        Self { offset, kind }
    }
}

impl std::fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.kind, self.offset)
    }
}

/// 累积文本中的一次完整命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOccurrence {
    pub kind: CommandKind,
    pub raw_payload: String,
    /// 标记起始字节偏移
    pub start: usize,
    /// 载荷结束字节偏移（不含）
    pub end: usize,
}

impl CommandOccurrence {
    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey::new(self.kind, self.start)
    }
}

/// 已出现标记但载荷尚未完整
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMarker {
    pub kind: CommandKind,
    pub start: usize,
}

impl PendingMarker {
    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey::new(self.kind, self.start)
    }
}

/// 一次扫描的结果
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// 按出现顺序排列的完整命令
    pub occurrences: Vec<CommandOccurrence>,
    /// 末尾未完整的命令（最多一个，它之后的文本都还属于它）
    pub pending: Option<PendingMarker>,
}

impl ScanResult {
    /// 第一个完整或未完整命令标记的偏移
    pub fn first_marker(&self) -> Option<usize> {
        self.occurrences
            .first()
            .map(|o| o.start)
            .or(self.pending.map(|p| p.start))
    }

    /// 最近一个命令的标识（包括未完整的）
    pub fn latest_key(&self) -> Option<OccurrenceKey> {
        self.pending
            .map(|p| p.key())
            .or_else(|| self.occurrences.last().map(|o| o.key()))
    }
}

/// 载荷匹配结果
enum PayloadMatch {
    /// 载荷完整，`[begin, end)`
    Complete { begin: usize, end: usize },
    /// 载荷尚未完整
    Incomplete,
    /// 标记后不是载荷（例如正文中提到了命令名）
    NotPayload,
}

/// 扫描累积文本
pub fn scan(text: &str, grammar: &CommandGrammar, mode: ScanMode) -> ScanResult {
    let mut result = ScanResult::default();
    let mut pos = 0;

    while let Some(rel) = text[pos..].find('/') {
        let at = pos + rel;
        let entry = match grammar.match_marker(text, at) {
            MarkerMatch::None => {
                pos = at + 1;
                continue;
            }
            MarkerMatch::Partial(entry) => {
                result.pending = Some(PendingMarker {
                    kind: entry.kind,
                    start: at,
                });
                break;
            }
            MarkerMatch::Found(entry) => entry,
        };

        let after = at + entry.marker.len();
        let matched = match entry.shape {
            PayloadShape::SingleObject => match_single(text, after),
            PayloadShape::ObjectRun => match_run(text, after, mode),
        };

        match matched {
            PayloadMatch::Complete { begin, end } => {
                result.occurrences.push(CommandOccurrence {
                    kind: entry.kind,
                    raw_payload: text[begin..end].to_string(),
                    start: at,
                    end,
                });
                pos = end;
            }
            PayloadMatch::Incomplete => {
                result.pending = Some(PendingMarker {
                    kind: entry.kind,
                    start: at,
                });
                break;
            }
            PayloadMatch::NotPayload => {
                pos = after;
            }
        }
    }

    result
}

/// 单对象载荷：标记后（跳过空白）紧跟一个平衡的 `{...}`
fn match_single(text: &str, from: usize) -> PayloadMatch {
    let begin = skip_whitespace(text, from);
    match text[begin..].chars().next() {
        None => PayloadMatch::Incomplete,
        Some('{') => match balanced_end(text, begin) {
            Some(end) => PayloadMatch::Complete { begin, end },
            None => PayloadMatch::Incomplete,
        },
        Some(_) => PayloadMatch::NotPayload,
    }
}

/// 对象串载荷：连续的平衡 `{...}`，以空行、非对象文本或输入结束（仅 Final）为止。
/// 也接受一个 JSON 数组。
fn match_run(text: &str, from: usize, mode: ScanMode) -> PayloadMatch {
    let begin = skip_whitespace(text, from);
    match text[begin..].chars().next() {
        None => return PayloadMatch::Incomplete,
        Some('[') => {
            return match balanced_end(text, begin) {
                Some(end) => PayloadMatch::Complete { begin, end },
                None => PayloadMatch::Incomplete,
            }
        }
        Some('{') => {}
        Some(_) => return PayloadMatch::NotPayload,
    }

    let mut cursor = begin;
    let mut last_end: Option<usize> = None;

    loop {
        let next = skip_whitespace(text, cursor);
        let gap = &text[cursor..next];

        if let Some(end) = last_end {
            if has_blank_line(gap) {
                return PayloadMatch::Complete { begin, end };
            }
        }

        if next == text.len() {
            return match (last_end, mode) {
                (Some(end), ScanMode::Final) => PayloadMatch::Complete { begin, end },
                _ => PayloadMatch::Incomplete,
            };
        }

        if let Some(end) = last_end {
            if !text[next..].starts_with('{') {
                return PayloadMatch::Complete { begin, end };
            }
        }

        match balanced_end(text, next) {
            Some(end) => {
                last_end = Some(end);
                cursor = end;
            }
            None => {
                return match (last_end, mode) {
                    // 流已结束：残缺的最后一项并入载荷，由解码器按坏条目跳过
                    (Some(_), ScanMode::Final) => PayloadMatch::Complete {
                        begin,
                        end: text.len(),
                    },
                    _ => PayloadMatch::Incomplete,
                };
            }
        }
    }
}

/// 把对象串载荷拆分为单个 JSON 对象文本
///
/// 每一项都是平衡的 `{...}`，最后一项可能是残缺的剩余文本。
pub fn split_objects(raw: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut cursor = 0;

    loop {
        let start = skip_whitespace(raw, cursor);
        if start == raw.len() {
            break;
        }
        match balanced_end(raw, start) {
            Some(end) => {
                items.push(&raw[start..end]);
                cursor = end;
            }
            None => {
                items.push(raw[start..].trim_end());
                break;
            }
        }
    }

    items
}

/// 从 `start` 处的 `{` 或 `[` 开始，返回与之平衡的闭括号之后的偏移
///
/// 跟踪字符串字面量与转义，字符串中的括号不计入深度。
pub fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + ch.len_utf8());
                }
            }
            _ => {
                if depth == 0 {
                    // 起始位置不是括号
                    return None;
                }
            }
        }
    }

    None
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

fn has_blank_line(gap: &str) -> bool {
    gap.matches('\n').count() >= 2
}
