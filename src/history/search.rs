//! 搜索子模块
//!
//! 匹配规则：
//! - 查询为空时原样返回完整列表
//! - 否则对 `content` 做不区分大小写的包含匹配
//! - 查询中包含 `image` / `text` 关键字时，对应类别的条目无论内容如何都会命中
//!
//! 两类命中取并集，结果保持原列表顺序。

use super::{ClipboardItem, HistoryStore, ItemKind};

/// 无状态的只读查询入口，供展示层使用。
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryService;

impl QueryService {
    pub fn search(&self, store: &HistoryStore, query: &str) -> Vec<ClipboardItem> {
        store.search(query)
    }
}

pub(super) fn filter(items: &[ClipboardItem], query: &str) -> Vec<ClipboardItem> {
    if query.is_empty() {
        return items.to_vec();
    }

    let needle = query.to_lowercase();
    items
        .iter()
        .filter(|item| matches(item, &needle))
        .cloned()
        .collect()
}

fn matches(item: &ClipboardItem, needle: &str) -> bool {
    item.content().to_lowercase().contains(needle) || matches_kind_keyword(item.kind(), needle)
}

fn matches_kind_keyword(kind: ItemKind, needle: &str) -> bool {
    needle.contains(kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MediaType;

    fn sample() -> Vec<ClipboardItem> {
        vec![
            ClipboardItem::new_text("Hello World", MediaType::String),
            ClipboardItem::new_image(vec![0_u8; 16], MediaType::Png),
            ClipboardItem::new_text("plain note", MediaType::String),
        ]
    }

    #[test]
    fn empty_query_returns_everything_in_order() {
        let items = sample();
        assert_eq!(filter(&items, ""), items);
    }

    #[test]
    fn content_match_is_case_insensitive() {
        let items = sample();
        let found = filter(&items, "hello");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content(), "Hello World");
    }

    #[test]
    fn image_keyword_matches_by_kind() {
        let items = sample();
        let found = filter(&items, "IMAGE");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind(), ItemKind::Image);
    }

    #[test]
    fn text_keyword_matches_all_text_items() {
        let items = sample();
        let found = filter(&items, "Text");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|item| item.kind() == ItemKind::Text));
    }

    #[test]
    fn image_description_is_searchable() {
        let items = sample();
        let found = filter(&items, "png");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn no_match_returns_empty() {
        assert!(filter(&sample(), "zzz").is_empty());
    }
}
