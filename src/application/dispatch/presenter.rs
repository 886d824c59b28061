//! Stream Presenter - 展示层输出
//!
//! 1. 展示文本：累积文本截至第一个命令标记（完整或未完整），命令语法不会出现在展示文本中
//! 2. 状态：当前消息最近一个命令的分发状态

use serde::{Deserialize, Serialize};

use super::ledger::{DispatchLedger, DispatchStatus};
use crate::domain::command::{scan, CommandGrammar, ScanMode, ScanResult};

/// 展示给渲染层的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentedStatus {
    /// 消息中没有命令
    None,
    Pending,
    Success,
    Error,
}

impl From<DispatchStatus> for PresentedStatus {
    fn from(status: DispatchStatus) -> Self {
        match status {
            DispatchStatus::Pending => PresentedStatus::Pending,
            DispatchStatus::Success => PresentedStatus::Success,
            DispatchStatus::Error => PresentedStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub display_text: String,
    pub status: PresentedStatus,
}

/// Stream Presenter
///
/// 纯函数：相同的累积文本与分发记录总是得到相同的输出
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamPresenter;

impl StreamPresenter {
    /// 从累积文本和分发记录计算展示结果
    pub fn present(
        accumulator: &str,
        grammar: &CommandGrammar,
        ledger: &DispatchLedger,
        mode: ScanMode,
    ) -> Presentation {
        let result = scan(accumulator, grammar, mode);
        Self::present_scan(accumulator, grammar, &result, ledger, mode)
    }

    /// 复用已有的扫描结果
    pub fn present_scan(
        accumulator: &str,
        grammar: &CommandGrammar,
        result: &ScanResult,
        ledger: &DispatchLedger,
        mode: ScanMode,
    ) -> Presentation {
        let cut = result.first_marker().or_else(|| match mode {
            // 流式中末尾的 `/crea` 可能是标记的开头，先隐藏
            ScanMode::Streaming => grammar.trailing_marker_prefix(accumulator),
            ScanMode::Final => None,
        });
        let visible = match cut {
            Some(end) => &accumulator[..end],
            None => accumulator,
        };

        let status = match result.latest_key() {
            None => PresentedStatus::None,
            Some(key) => ledger
                .status(&key)
                .map(PresentedStatus::from)
                .unwrap_or(PresentedStatus::Pending),
        };

        Presentation {
            display_text: visible.trim_end().to_string(),
            status,
        }
    }
}
