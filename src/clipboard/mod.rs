//! 剪贴板监控模块
//!
//! # 设计思路
//!
//! 以固定间隔轮询数据源的变化令牌，发现新内容后写入历史：
//! - **变化检测**：只比较 `ChangeVersion`，令牌未变时不读取任何内容
//! - **自写入屏蔽**：应用把历史条目写回剪贴板前进入 `IgnoringOne` 状态，
//!   下一次变化只更新令牌、不入库
//! - **类型探测**：图片表示（TIFF → PNG → PDF → JPEG）优先于纯文本
//!
//! # 实现思路
//!
//! - 屏蔽标志是显式状态机 `IgnoreState { Idle, IgnoringOne }`，
//!   只在所有者任务上迁移，不需要原子变量或全局单例。
//! - 一次变化分三步处理：`detect` 只比较令牌，`capture_item` 读取内容，
//!   `finish_capture` 去重入库。读取是阻塞调用，服务层把它放到阻塞线程池，
//!   所有者任务只执行第一步和第三步。
//! - 读取进行中不再发起新的读取，令牌也不推进，读取结束后的下一次轮询会看到期间的变化。
//! - 写回同样拆成 `mark_self_initiated_write` → `write_item` → `finish_write`；
//!   `copy_to_source` 把三步串起来，供同步调用方使用。
//! - 读取失败按“没有该类型内容”处理，`tick` 永远不会失败。

mod arboard_source;
mod source;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::history::{ClipboardItem, HistoryStore, ItemKind, MediaType, IMAGE_PRIORITY};

pub use arboard_source::ArboardSource;
pub use source::{ChangeVersion, ClipboardSource, ImagePayload, MemoryClipboard};

/// 自写入屏蔽状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreState {
    Idle,
    IgnoringOne,
}

/// 单次轮询的结果，供日志与测试观察
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 令牌未变化
    Unchanged,
    /// 读取令牌失败，本次跳过
    VersionUnavailable,
    /// 吸收了应用自身的写入
    SelfWriteAbsorbed,
    /// 没有受支持的表示，或文本为空
    NoContent,
    /// 上一次内容读取尚未完成，本次跳过
    CaptureInFlight,
    /// 与最新条目重复，被去重
    Duplicate,
    /// 成功新增条目
    Added(Uuid),
}

/// `detect` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// 无需读取内容
    Settled(TickOutcome),
    /// 令牌已变化，读取内容后交给 `finish_capture`
    Changed,
}

/// 剪贴板变化监控器
pub struct ChangeMonitor<S: ClipboardSource> {
    source: S,
    last_seen: Option<ChangeVersion>,
    ignore: IgnoreState,
    capturing: bool,
}

impl<S: ClipboardSource> ChangeMonitor<S> {
    /// 创建监控器，并记录当前令牌，启动前已在剪贴板里的内容不会入库。
    pub fn new(mut source: S) -> Self {
        let last_seen = match source.current_version() {
            Ok(version) => Some(version),
            Err(err) => {
                log::warn!("读取初始剪贴板令牌失败，首次变化时再同步: {}", err);
                None
            }
        };
        Self {
            source,
            last_seen,
            ignore: IgnoreState::Idle,
            capturing: false,
        }
    }

    pub fn ignore_state(&self) -> IgnoreState {
        self.ignore
    }

    /// 在写回剪贴板之前调用，使下一次变化被吸收。
    pub fn mark_self_initiated_write(&mut self) {
        self.ignore = IgnoreState::IgnoringOne;
        log::debug!("🚫 已标记自写入 - 下一次剪贴板变化将被忽略");
    }

    /// 比较变化令牌，不读取内容。
    ///
    /// 返回 `Changed` 时进入读取中状态，直到调用 `finish_capture`。
    pub fn detect(&mut self) -> Detection {
        if self.capturing {
            return Detection::Settled(TickOutcome::CaptureInFlight);
        }

        let version = match self.source.current_version() {
            Ok(version) => version,
            Err(err) => {
                log::debug!("读取剪贴板令牌失败，跳过本次轮询: {}", err);
                return Detection::Settled(TickOutcome::VersionUnavailable);
            }
        };

        if self.last_seen == Some(version) {
            return Detection::Settled(TickOutcome::Unchanged);
        }
        self.last_seen = Some(version);

        if self.ignore == IgnoreState::IgnoringOne {
            self.ignore = IgnoreState::Idle;
            log::debug!("⏭️  忽略应用主动触发的剪贴板变化");
            return Detection::Settled(TickOutcome::SelfWriteAbsorbed);
        }

        self.capturing = true;
        Detection::Changed
    }

    /// 结束一次读取，把读到的内容去重后写入历史。
    pub fn finish_capture(&mut self, store: &mut HistoryStore, item: Option<ClipboardItem>) -> TickOutcome {
        self.capturing = false;
        let Some(item) = item else {
            return TickOutcome::NoContent;
        };

        let id = item.id();
        if store.add(item) {
            TickOutcome::Added(id)
        } else {
            TickOutcome::Duplicate
        }
    }

    /// 在当前线程完成一次完整轮询。
    pub fn tick(&mut self, store: &mut HistoryStore) -> TickOutcome {
        match self.detect() {
            Detection::Settled(outcome) => outcome,
            Detection::Changed => {
                let item = capture_item(&mut self.source);
                self.finish_capture(store, item)
            }
        }
    }

    /// 写回结束后调用。写入失败时回到 `Idle`，避免吞掉用户的下一次真实复制。
    pub fn finish_write(&mut self, result: &AppResult<()>) {
        if let Err(err) = result {
            log::warn!("写回剪贴板失败，恢复变化监听: {}", err);
            self.ignore = IgnoreState::Idle;
        }
    }

    /// 把历史条目写回剪贴板，写入前自动标记自写入。
    pub fn copy_to_source(&mut self, item: &ClipboardItem) -> AppResult<()> {
        self.mark_self_initiated_write();
        let result = write_item(&mut self.source, item);
        self.finish_write(&result);
        result
    }
}

/// 读取剪贴板内容：图片表示优先，其次为非空文本。
pub fn capture_item<S: ClipboardSource>(source: &mut S) -> Option<ClipboardItem> {
    match source.read_image(&IMAGE_PRIORITY) {
        Ok(Some(image)) => {
            log::debug!("🖼️  捕获图片: {} 字节 ({})", image.bytes.len(), image.media_type.as_str());
            return Some(ClipboardItem::new_image(image.bytes, image.media_type));
        }
        Ok(None) => {}
        Err(err) => log::debug!("读取剪贴板图片失败，按无图片处理: {}", err),
    }

    match source.read_text() {
        Ok(Some(text)) if !text.is_empty() => Some(ClipboardItem::new_text(text, MediaType::String)),
        Ok(_) => None,
        Err(err) => {
            log::debug!("读取剪贴板文本失败，按无文本处理: {}", err);
            None
        }
    }
}

/// 按条目类型写回剪贴板。
pub fn write_item<S: ClipboardSource>(source: &mut S, item: &ClipboardItem) -> AppResult<()> {
    match item.kind() {
        ItemKind::Text => source.write_text(item.content())?,
        ItemKind::Image => match item.payload() {
            Some(bytes) => source.write_image(bytes, item.media_type())?,
            None => return Err(AppError::Clipboard(format!("图片条目 {} 缺少数据", item.id()))),
        },
    }
    log::info!("📋 已写回剪贴板: {}", item.preview());
    Ok(())
}
