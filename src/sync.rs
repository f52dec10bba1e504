//! 远端同步模块
//!
//! # 设计思路
//!
//! 与远端的同步是“单向累加”的：
//! - **拉取**：读取远端全部记录，按远端创建时间倒序，交给 `HistoryStore::merge_remote`
//! - **推送**：把最新的至多 `push_limit` 条本地条目按 id 覆盖写入远端
//! - **清理**：全部删除 / 按 id 删除远端记录，不隐含任何本地修改
//!
//! 远端不可用时所有操作都退化为记录日志的空操作，不影响本地历史。
//!
//! # 实现思路
//!
//! - 具体后端隐藏在 `RemoteStore` trait 之后（`http` / `memory` 子模块）。
//! - `pull` / `push` 只做 I/O，不持有 `HistoryStore`，可以在工作任务中执行；
//!   结果交回所有者任务后再合并，保证所有修改都在同一个任务上发生。

mod http;
mod memory;
mod remote;

use std::sync::Arc;

use uuid::Uuid;

use crate::history::{ClipboardItem, HistoryStore};

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use remote::{RemoteRecord, RemoteStore};

/// 默认每次推送的最大条数
pub const DEFAULT_PUSH_LIMIT: usize = 50;

/// 本地历史与远端存储之间的同步器
#[derive(Clone)]
pub struct SyncReconciler {
    remote: Arc<dyn RemoteStore>,
    push_limit: usize,
}

impl SyncReconciler {
    pub fn new(remote: Arc<dyn RemoteStore>, push_limit: usize) -> Self {
        Self {
            remote,
            push_limit: push_limit.max(1),
        }
    }

    pub fn push_limit(&self) -> usize {
        self.push_limit
    }

    /// 拉取远端全部条目，按远端创建时间倒序。
    ///
    /// 远端不可用或请求失败时返回空列表；无法还原的记录被跳过。
    pub async fn pull(&self) -> Vec<ClipboardItem> {
        if !self.remote.is_available().await {
            log::info!("☁️  远端不可用，跳过拉取");
            return Vec::new();
        }

        let mut records = match self.remote.fetch_all().await {
            Ok(records) => records,
            Err(err) => {
                log::warn!("拉取远端记录失败，本周期跳过: {}", err);
                return Vec::new();
            }
        };
        records.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));

        let total = records.len();
        let items: Vec<ClipboardItem> = records
            .into_iter()
            .filter_map(|record| match ClipboardItem::try_from(record.item) {
                Ok(item) => Some(item),
                Err(err) => {
                    log::warn!("跳过无效的远端记录: {}", err);
                    None
                }
            })
            .collect();

        log::debug!("☁️  拉取到 {}/{} 条远端记录", items.len(), total);
        items
    }

    /// 拉取并合并，返回新增条数。
    pub async fn pull_and_merge(&self, store: &mut HistoryStore) -> usize {
        let items = self.pull().await;
        if items.is_empty() {
            return 0;
        }
        store.merge_remote(items)
    }

    /// 最新的至多 `push_limit` 条本地条目，转换为远端记录。
    pub fn recent_batch(&self, store: &HistoryStore) -> Vec<RemoteRecord> {
        store
            .recent(self.push_limit)
            .iter()
            .map(RemoteRecord::from)
            .collect()
    }

    /// 上传一批记录，返回是否成功。空批次直接视为成功。
    pub async fn push(&self, batch: Vec<RemoteRecord>) -> bool {
        if batch.is_empty() {
            return true;
        }
        if !self.remote.is_available().await {
            log::info!("☁️  远端不可用，跳过推送");
            return false;
        }

        let count = batch.len();
        match self.remote.upsert(batch).await {
            Ok(()) => {
                log::info!("☁️  已推送 {} 条记录到远端", count);
                true
            }
            Err(err) => {
                log::warn!("推送远端记录失败，下个周期重试: {}", err);
                false
            }
        }
    }

    pub async fn push_recent(&self, store: &HistoryStore) -> bool {
        self.push(self.recent_batch(store)).await
    }

    /// 删除远端全部记录，不修改本地历史。
    pub async fn clear_remote(&self) -> bool {
        if !self.remote.is_available().await {
            log::warn!("远端不可用，无法清空远端记录");
            return false;
        }
        match self.remote.delete_all().await {
            Ok(()) => {
                log::info!("🧹 已清空远端记录");
                true
            }
            Err(err) => {
                log::error!("清空远端记录失败: {}", err);
                false
            }
        }
    }

    /// 按 id 删除远端记录。
    pub async fn delete_remote(&self, id: Uuid) -> bool {
        if !self.remote.is_available().await {
            return false;
        }
        match self.remote.delete(id).await {
            Ok(()) => {
                log::debug!("🗑️  已删除远端记录: {}", id);
                true
            }
            Err(err) => {
                log::warn!("删除远端记录 {} 失败: {}", id, err);
                false
            }
        }
    }
}
