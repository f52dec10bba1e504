//! 远端存储契约

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::history::ClipboardItem;
use crate::storage::ItemRecord;

/// 远端记录：本地记录字段 + 远端分配的创建时间（只用于远端排序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    #[serde(flatten)]
    pub item: ItemRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    /// 排序键：没有远端时间时退回条目自身的时间戳
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(self.item.timestamp)
    }
}

impl From<&ClipboardItem> for RemoteRecord {
    fn from(item: &ClipboardItem) -> Self {
        Self {
            item: ItemRecord::from(item),
            created_at: None,
        }
    }
}

/// 以 `id` 为键的远端记录存储。
///
/// 任何实现都只需满足按 id 覆盖写入、全量读取、按 id 删除和全部删除。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 远端当前是否可用（账号状态、网络等）
    async fn is_available(&self) -> bool {
        true
    }

    async fn fetch_all(&self) -> AppResult<Vec<RemoteRecord>>;

    /// 按 id 覆盖写入；已存在的记录保留原有 `created_at`。
    async fn upsert(&self, records: Vec<RemoteRecord>) -> AppResult<()>;

    /// 删除单条记录，不存在时视为成功。
    async fn delete(&self, id: Uuid) -> AppResult<()>;

    async fn delete_all(&self) -> AppResult<()>;
}
