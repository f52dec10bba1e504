//! 本地持久化模块
//!
//! # 设计思路
//!
//! 把整个历史列表作为一份完整快照写入 JSON 文件，进程重启后再读回：
//! - 每次保存整体覆盖，不做增量日志
//! - 首次运行和文件损坏同等对待，一律视为“空历史”
//! - 保存失败只记录日志，由调用方在下一个自动保存周期重试
//!
//! # 实现思路
//!
//! - 先写入同目录下的临时文件，再 `rename` 覆盖正式文件，避免写到一半的快照。
//! - 图片字节以 base64 存入 `payload` 字段，时间戳为 RFC 3339。
//! - 读取时逐条校验，单条记录无效只跳过该条，不影响其余条目。
//! - 方法都是同步阻塞的，由 `service` 放到 `spawn_blocking` 中执行。

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::history::{ClipboardItem, ItemKind, MediaType};

/// 持久化与远端共用的条目记录格式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: Uuid,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub media_type: MediaType,
    pub kind: ItemKind,
}

impl From<&ClipboardItem> for ItemRecord {
    fn from(item: &ClipboardItem) -> Self {
        Self {
            id: item.id(),
            content: item.content().to_string(),
            payload: item.payload().map(|bytes| BASE64.encode(bytes)),
            timestamp: item.timestamp(),
            media_type: item.media_type(),
            kind: item.kind(),
        }
    }
}

impl TryFrom<ItemRecord> for ClipboardItem {
    type Error = AppError;

    fn try_from(record: ItemRecord) -> AppResult<Self> {
        let payload = record
            .payload
            .map(|encoded| {
                BASE64
                    .decode(encoded)
                    .map_err(|e| AppError::Storage(format!("条目 {} 的 payload 解码失败: {}", record.id, e)))
            })
            .transpose()?;

        ClipboardItem::from_parts(
            record.id,
            record.kind,
            record.content,
            payload,
            record.timestamp,
            record.media_type,
        )
    }
}

/// 本地快照文件
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 保存完整快照，失败时记录日志并返回 `false`。
    pub fn save(&self, items: &[ClipboardItem]) -> bool {
        match self.write_snapshot(items) {
            Ok(()) => {
                log::debug!("💾 已保存 {} 条历史到 {}", items.len(), self.path.display());
                true
            }
            Err(err) => {
                log::error!("保存历史快照失败 ({}): {}", self.path.display(), err);
                false
            }
        }
    }

    /// 写入快照并返回具体错误，供需要区分失败原因的调用方使用。
    pub fn write_snapshot(&self, items: &[ClipboardItem]) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::Storage(format!("创建数据目录 '{}' 失败: {}", parent.display(), e))
                })?;
            }
        }

        let records: Vec<ItemRecord> = items.iter().map(ItemRecord::from).collect();
        let content = serde_json::to_vec_pretty(&records)?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// 读取快照。文件不存在或格式错误时返回空列表。
    pub fn load(&self) -> Vec<ClipboardItem> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("未找到历史快照，从空历史开始: {}", self.path.display());
                return Vec::new();
            }
            Err(err) => {
                log::warn!("读取历史快照失败，从空历史开始: {}", err);
                return Vec::new();
            }
        };

        let raw: Vec<serde_json::Value> = match serde_json::from_slice(&content) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("历史快照格式错误，从空历史开始: {}", err);
                return Vec::new();
            }
        };

        let total = raw.len();
        let items: Vec<ClipboardItem> = raw
            .into_iter()
            .filter_map(|value| match decode_record(value) {
                Ok(item) => Some(item),
                Err(err) => {
                    log::warn!("跳过无效的历史记录: {}", err);
                    None
                }
            })
            .collect();

        log::info!("📂 从快照恢复 {}/{} 条历史", items.len(), total);
        items
    }

    /// 删除快照文件，文件不存在视为成功。
    pub fn clear(&self) -> bool {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("🗑️  已删除历史快照: {}", self.path.display());
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => {
                log::error!("删除历史快照失败: {}", err);
                false
            }
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn decode_record(value: serde_json::Value) -> AppResult<ClipboardItem> {
    let record: ItemRecord = serde_json::from_value(value)?;
    ClipboardItem::try_from(record)
}
