//! Dispatch Ledger - 分发记录
//!
//! 防止重复执行的唯一状态。每个命令出现（种类 + 偏移）至多一条记录，
//! 状态只能从 `Pending` 进入 `Success` 或 `Error`，进入终态后不再变化。

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::command::{CommandKind, OccurrenceKey};

/// 分发状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    /// 已开始解码 / 执行，尚未完成
    Pending,
    Success,
    Error,
}

impl DispatchStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DispatchStatus::Pending)
    }
}

/// 失败原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 载荷解码失败
    Decode,
    /// 前置条件不满足
    Precondition,
    /// 没有注册处理器
    Unregistered,
    /// 处理器执行失败
    Handler,
    /// 回合结束时载荷仍未完整
    Truncated,
}

/// 一条分发记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub key: OccurrenceKey,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchRecord {
    pub fn kind(&self) -> CommandKind {
        self.key.kind
    }
}

/// 分发记录表（按出现顺序）
#[derive(Debug, Clone, Default)]
pub struct DispatchLedger {
    records: BTreeMap<OccurrenceKey, DispatchRecord>,
}

impl DispatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新出现的命令，已登记过则返回 false
    pub fn begin(&mut self, key: OccurrenceKey) -> bool {
        if self.records.contains_key(&key) {
            return false;
        }
        self.records.insert(
            key,
            DispatchRecord {
                key,
                status: DispatchStatus::Pending,
                failure: None,
                error: None,
            },
        );
        true
    }

    /// `Pending -> Success`
    pub fn resolve_success(&mut self, key: OccurrenceKey) -> bool {
        match self.records.get_mut(&key) {
            Some(record) if record.status == DispatchStatus::Pending => {
                record.status = DispatchStatus::Success;
                true
            }
            _ => false,
        }
    }

    /// `Pending -> Error`
    pub fn resolve_error(
        &mut self,
        key: OccurrenceKey,
        failure: FailureKind,
        error: impl Into<String>,
    ) -> bool {
        match self.records.get_mut(&key) {
            Some(record) if record.status == DispatchStatus::Pending => {
                record.status = DispatchStatus::Error;
                record.failure = Some(failure);
                record.error = Some(error.into());
                true
            }
            _ => false,
        }
    }

    /// 直接登记为失败（用于从未进入分发的命令，如被截断的载荷）
    pub fn record_error(
        &mut self,
        key: OccurrenceKey,
        failure: FailureKind,
        error: impl Into<String>,
    ) -> bool {
        self.begin(key) && self.resolve_error(key, failure, error)
    }

    pub fn contains(&self, key: &OccurrenceKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &OccurrenceKey) -> Option<&DispatchRecord> {
        self.records.get(key)
    }

    pub fn status(&self, key: &OccurrenceKey) -> Option<DispatchStatus> {
        self.records.get(key).map(|r| r.status)
    }

    /// 所有记录，按标记出现顺序
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
