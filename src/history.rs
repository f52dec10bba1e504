//! 剪贴板历史模块
//!
//! # 设计思路
//!
//! 历史记录是整个系统唯一的内存数据源：
//! - **数据模型**：`ClipboardItem` 为不可变值对象，创建后任何字段都不会再被修改
//! - **存储**：`HistoryStore` 维护有序、有界、相邻去重的列表（`store` 子模块）
//! - **查询**：`QueryService` 只读过滤，供展示层搜索使用（`search` 子模块）
//!
//! # 实现思路
//!
//! - `id` 使用 UUID v4，作为删除与远端合并的唯一键。
//! - 图片条目的 `content` 是生成的描述文本（格式名 + 体积），原始字节放在 `payload`。
//! - `MediaType` 记录条目来自哪种剪贴板表示，写回剪贴板时按原格式还原。

mod search;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub use search::QueryService;
pub use store::{HistoryEvent, HistoryStore};

/// 本地默认保留条数。
pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 50;

/// 远端合并后允许的临时上限，下一次本地新增时会再裁剪回 `max_items`。
pub const DEFAULT_MERGE_CEILING: usize = 1000;

/// 图片表示的探测顺序，先命中者优先。
pub const IMAGE_PRIORITY: [MediaType; 4] = [
    MediaType::Tiff,
    MediaType::Png,
    MediaType::Pdf,
    MediaType::Jpeg,
];

/// 条目类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Image,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

/// 条目来源的剪贴板表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    String,
    Png,
    Tiff,
    Pdf,
    Jpeg,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::Pdf => "pdf",
            Self::Jpeg => "jpeg",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, Self::String)
    }

    /// 图片描述中使用的格式名
    fn display_name(self) -> &'static str {
        match self {
            Self::Tiff => "TIFF",
            Self::Png => "PNG",
            Self::Pdf => "PDF",
            Self::Jpeg => "JPEG",
            Self::String => "Image",
        }
    }
}

/// 剪贴板历史条目
///
/// 字段私有，只能通过构造函数创建，保证条目在生命周期内不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardItem {
    id: Uuid,
    kind: ItemKind,
    content: String,
    payload: Option<Vec<u8>>,
    timestamp: DateTime<Utc>,
    media_type: MediaType,
}

impl ClipboardItem {
    /// 从剪贴板文本创建新条目。
    pub fn new_text(content: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ItemKind::Text,
            content: content.into(),
            payload: None,
            timestamp: Utc::now(),
            media_type,
        }
    }

    /// 从图片字节创建新条目，`content` 为 `"[PNG Image - 2 KB]"` 形式的描述。
    pub fn new_image(bytes: Vec<u8>, media_type: MediaType) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ItemKind::Image,
            content: describe_image(media_type, bytes.len()),
            payload: Some(bytes),
            timestamp: Utc::now(),
            media_type,
        }
    }

    /// 从持久化记录或远端记录还原条目，保留原始 `id` 与时间戳。
    ///
    /// 图片条目必须携带 `payload` 且格式为图片；文本条目的 `payload` 会被丢弃。
    pub fn from_parts(
        id: Uuid,
        kind: ItemKind,
        content: String,
        payload: Option<Vec<u8>>,
        timestamp: DateTime<Utc>,
        media_type: MediaType,
    ) -> AppResult<Self> {
        let payload = match kind {
            ItemKind::Text => None,
            ItemKind::Image => {
                if !media_type.is_image() {
                    return Err(AppError::Storage(format!(
                        "图片条目 {} 的格式不是图片: {}",
                        id,
                        media_type.as_str()
                    )));
                }
                Some(payload.ok_or_else(|| {
                    AppError::Storage(format!("图片条目 {} 缺少 payload", id))
                })?)
            }
        };
        Ok(Self {
            id,
            kind,
            content,
            payload,
            timestamp,
            media_type,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// 相邻去重判定：文本比较内容，图片只比较字节长度。
    pub(crate) fn is_same_entry(&self, other: &ClipboardItem) -> bool {
        match (self.kind, other.kind) {
            (ItemKind::Text, ItemKind::Text) => self.content == other.content,
            (ItemKind::Image, ItemKind::Image) => {
                self.payload.as_ref().map(Vec::len) == other.payload.as_ref().map(Vec::len)
            }
            _ => false,
        }
    }

    /// 日志用的简短预览
    pub fn preview(&self) -> String {
        let mut preview: String = self.content.chars().take(50).collect();
        if self.content.chars().count() > 50 {
            preview.push_str("...");
        }
        preview
    }
}

fn describe_image(media_type: MediaType, len: usize) -> String {
    format!("[{} Image - {}]", media_type.display_name(), format_byte_count(len))
}

/// 按二进制单位格式化字节数：`"100 bytes"`、`"2 KB"`、`"1.5 MB"`。
pub fn format_byte_count(len: usize) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    match len {
        0 => return "Zero KB".to_string(),
        1 => return "1 byte".to_string(),
        n if n < 1024 => return format!("{} bytes", n),
        _ => {}
    }

    // 先按显示精度取整，再判断是否进位
    let mut value = len as f64 / 1024.0;
    let mut unit = 0;
    while round_for_unit(value, unit) >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = round_for_unit(value, unit);
    if unit == 0 {
        format!("{:.0} {}", rounded, UNITS[unit])
    } else {
        let text = format!("{:.1}", rounded);
        let text = text.strip_suffix(".0").unwrap_or(&text);
        format!("{} {}", text, UNITS[unit])
    }
}

/// KB 显示为整数，更大的单位保留一位小数。
fn round_for_unit(value: f64, unit: usize) -> f64 {
    if unit == 0 {
        value.round()
    } else {
        (value * 10.0).round() / 10.0
    }
}
