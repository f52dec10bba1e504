//! 历史存储子模块
//!
//! ## 职责
//! - 维护按插入顺序倒序排列的条目列表（最新在下标 0）
//! - 新增时做相邻去重，并从尾部裁剪到 `max_items`
//! - 按 `id` 合并远端条目，合并后以 `merge_ceiling` 为上限
//!
//! ## 并发语义
//! `HistoryStore` 本身不加锁，只能由单一所有者（`service` 的所有者任务）修改。
//! 每次成功修改后通过 `broadcast` 通道发出 `HistoryEvent::Updated`。

use std::collections::HashSet;

use tokio::sync::broadcast;
use uuid::Uuid;

use super::{search, ClipboardItem, DEFAULT_MAX_HISTORY_ITEMS, DEFAULT_MERGE_CEILING};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 历史变更通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// 列表内容发生变化，携带变化后的条目数
    Updated { len: usize },
}

/// 有界、相邻去重、按时间倒序的剪贴板历史。
#[derive(Debug)]
pub struct HistoryStore {
    items: Vec<ClipboardItem>,
    max_items: usize,
    merge_ceiling: usize,
    events: broadcast::Sender<HistoryEvent>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_ITEMS, DEFAULT_MERGE_CEILING)
    }
}

impl HistoryStore {
    /// 创建空存储。
    ///
    /// `max_items` 至少为 1，`merge_ceiling` 不会低于 `max_items`。
    pub fn new(max_items: usize, merge_ceiling: usize) -> Self {
        let max_items = max_items.max(1);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            items: Vec::new(),
            max_items,
            merge_ceiling: merge_ceiling.max(max_items),
            events,
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn merge_ceiling(&self) -> usize {
        self.merge_ceiling
    }

    /// 订阅变更通知。
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<HistoryEvent> {
        self.events.clone()
    }

    /// 新增条目。
    ///
    /// 只与当前最新条目比较：相同则静默忽略并返回 `false`。
    /// 不同则插入头部并从尾部裁剪到 `max_items`。
    pub fn add(&mut self, item: ClipboardItem) -> bool {
        if let Some(head) = self.items.first() {
            if head.is_same_entry(&item) {
                log::trace!("⏭️  与最新条目相同，跳过: {}", item.preview());
                return false;
            }
        }

        log::debug!("📋 新增历史条目: {}", item.preview());
        self.items.insert(0, item);
        self.items.truncate(self.max_items);
        self.notify();
        true
    }

    /// 按 `id` 删除条目，不存在时为空操作。
    pub fn delete(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id() != id);
        let removed = self.items.len() != before;
        if !removed {
            log::debug!("删除的条目不存在: {}", id);
        }
        self.notify();
        removed
    }

    /// 清空全部条目。
    pub fn clear(&mut self) {
        self.items.clear();
        log::info!("🧹 已清空剪贴板历史");
        self.notify();
    }

    /// 合并远端条目，返回实际新增的数量。
    ///
    /// 仅 `id` 未出现过的条目会被插入头部，并保持传入顺序；
    /// 本地已有的 `id` 一律以本地为准。合并后以 `merge_ceiling` 截断尾部。
    pub fn merge_remote(&mut self, remote: Vec<ClipboardItem>) -> usize {
        let mut known: HashSet<Uuid> = self.items.iter().map(ClipboardItem::id).collect();
        let fresh: Vec<ClipboardItem> = remote
            .into_iter()
            .filter(|item| known.insert(item.id()))
            .collect();

        let added = fresh.len();
        if added == 0 {
            return 0;
        }

        let mut merged = fresh;
        merged.append(&mut self.items);
        merged.truncate(self.merge_ceiling);
        self.items = merged;

        log::info!("✅ 从远端合并 {} 条新条目", added);
        self.notify();
        added
    }

    /// 用持久化快照替换当前内容（启动时调用），以 `merge_ceiling` 为上限。
    pub fn restore(&mut self, mut items: Vec<ClipboardItem>) {
        items.truncate(self.merge_ceiling);
        self.items = items;
        self.notify();
    }

    /// 完整的有序列表（只读）。
    pub fn snapshot(&self) -> &[ClipboardItem] {
        &self.items
    }

    /// 最新的至多 `limit` 条。
    pub fn recent(&self, limit: usize) -> &[ClipboardItem] {
        &self.items[..limit.min(self.items.len())]
    }

    pub fn get(&self, id: Uuid) -> Option<&ClipboardItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn head(&self) -> Option<&ClipboardItem> {
        self.items.first()
    }

    /// 不区分大小写的文本搜索，规则见 `search` 子模块。
    pub fn search(&self, query: &str) -> Vec<ClipboardItem> {
        search::filter(&self.items, query)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn notify(&self) {
        // 没有订阅者时发送会失败，属于正常情况
        let _ = self.events.send(HistoryEvent::Updated {
            len: self.items.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MediaType;

    fn text(content: &str) -> ClipboardItem {
        ClipboardItem::new_text(content, MediaType::String)
    }

    #[test]
    fn add_skips_duplicate_head() {
        let mut store = HistoryStore::default();
        assert!(store.add(text("alpha")));
        let head_id = store.head().map(ClipboardItem::id);

        assert!(!store.add(text("alpha")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.head().map(ClipboardItem::id), head_id);
    }

    #[test]
    fn dedup_is_adjacency_only() {
        let mut store = HistoryStore::default();
        store.add(text("a"));
        store.add(text("b"));
        assert!(store.add(text("a")));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn add_trims_oldest_beyond_capacity() {
        let mut store = HistoryStore::new(3, 10);
        for i in 0..5 {
            store.add(text(&format!("item {i}")));
        }
        let contents: Vec<&str> = store.snapshot().iter().map(ClipboardItem::content).collect();
        assert_eq!(contents, vec!["item 4", "item 3", "item 2"]);
    }

    #[test]
    fn delete_missing_id_is_noop() {
        let mut store = HistoryStore::default();
        store.add(text("keep"));
        assert!(!store.delete(Uuid::new_v4()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn merge_keeps_supplied_order_and_ignores_known_ids() {
        let mut store = HistoryStore::default();
        let local = text("local");
        store.add(local.clone());

        let changed_copy = ClipboardItem::from_parts(
            local.id(),
            local.kind(),
            "remote edit".to_string(),
            None,
            local.timestamp(),
            local.media_type(),
        )
        .expect("valid parts");
        let r1 = text("r1");
        let r2 = text("r2");

        let added = store.merge_remote(vec![r1.clone(), changed_copy, r2.clone()]);
        assert_eq!(added, 2);

        let ids: Vec<Uuid> = store.snapshot().iter().map(ClipboardItem::id).collect();
        assert_eq!(ids, vec![r1.id(), r2.id(), local.id()]);
        assert_eq!(store.get(local.id()).map(ClipboardItem::content), Some("local"));
    }

    #[test]
    fn merge_caps_at_ceiling_not_max_items() {
        let mut store = HistoryStore::new(2, 4);
        store.add(text("x"));
        let remote: Vec<ClipboardItem> = (0..6).map(|i| text(&format!("r{i}"))).collect();

        assert_eq!(store.merge_remote(remote), 6);
        assert_eq!(store.len(), 4);

        store.add(text("fresh"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn merge_with_nothing_new_sends_no_event() {
        let mut store = HistoryStore::default();
        let item = text("one");
        store.add(item.clone());
        let mut rx = store.subscribe();

        assert_eq!(store.merge_remote(vec![item]), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mutations_notify_subscribers() {
        let mut store = HistoryStore::default();
        let mut rx = store.subscribe();

        store.add(text("a"));
        store.clear();

        assert_eq!(rx.try_recv().ok(), Some(HistoryEvent::Updated { len: 1 }));
        assert_eq!(rx.try_recv().ok(), Some(HistoryEvent::Updated { len: 0 }));
    }

    #[test]
    fn recent_is_bounded_by_len() {
        let mut store = HistoryStore::default();
        store.add(text("a"));
        store.add(text("b"));
        assert_eq!(store.recent(50).len(), 2);
        assert_eq!(store.recent(1)[0].content(), "b");
    }
}
