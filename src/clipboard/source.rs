//! 剪贴板数据源抽象
//!
//! ## 设计思路
//!
//! 监控器只依赖 `ClipboardSource` trait，不直接接触操作系统剪贴板：
//! - `current_version`：廉价的变化令牌，只要内容变化就会改变
//! - `read_*` / `write_*`：按类型读写内容
//!
//! 系统实现见 `arboard_source`；`MemoryClipboard` 为进程内实现，
//! 用于测试以及无图形环境下的演示运行。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::history::MediaType;

/// 不透明的剪贴板变化令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeVersion(pub u64);

/// 从剪贴板读出的图片数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
}

/// 剪贴板数据源契约。
///
/// 读取失败由调用方视为“没有该类型内容”，不会中断轮询。
pub trait ClipboardSource: Send {
    fn current_version(&mut self) -> AppResult<ChangeVersion>;

    fn read_text(&mut self) -> AppResult<Option<String>>;

    /// 按 `priority` 顺序探测图片表示，返回第一个命中的格式。
    fn read_image(&mut self, priority: &[MediaType]) -> AppResult<Option<ImagePayload>>;

    fn write_text(&mut self, text: &str) -> AppResult<()>;

    fn write_image(&mut self, bytes: &[u8], media_type: MediaType) -> AppResult<()>;
}

#[derive(Debug, Default)]
struct MemoryClipboardInner {
    version: u64,
    text: Option<String>,
    images: HashMap<MediaType, Vec<u8>>,
    fail_reads: bool,
    fail_writes: bool,
    read_delay: Option<Duration>,
}

/// 进程内剪贴板。
///
/// 克隆出的句柄共享同一份内容，测试中可以一边交给监控器、一边模拟外部复制。
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    inner: Arc<Mutex<MemoryClipboardInner>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryClipboardInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("内存剪贴板锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 模拟外部程序复制文本：清空旧内容并推进版本。
    pub fn copy_text(&self, text: &str) {
        let mut inner = self.lock();
        inner.text = Some(text.to_string());
        inner.images.clear();
        inner.version += 1;
    }

    /// 模拟外部程序复制图片（可同时携带文本表示）。
    pub fn copy_image(&self, media_type: MediaType, bytes: Vec<u8>, text: Option<&str>) {
        let mut inner = self.lock();
        inner.images.clear();
        inner.images.insert(media_type, bytes);
        inner.text = text.map(str::to_string);
        inner.version += 1;
    }

    /// 只推进版本、不改变内容（例如复制了不支持的格式）。
    pub fn bump_version(&self) {
        let mut inner = self.lock();
        inner.text = None;
        inner.images.clear();
        inner.version += 1;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// 模拟缓慢的剪贴板：每次读取内容前阻塞当前线程。
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.lock().read_delay = delay;
    }

    fn wait_before_read(&self) {
        let delay = self.lock().read_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
    }

    pub fn text(&self) -> Option<String> {
        self.lock().text.clone()
    }

    pub fn image(&self, media_type: MediaType) -> Option<Vec<u8>> {
        self.lock().images.get(&media_type).cloned()
    }
}

impl ClipboardSource for MemoryClipboard {
    fn current_version(&mut self) -> AppResult<ChangeVersion> {
        Ok(ChangeVersion(self.lock().version))
    }

    fn read_text(&mut self) -> AppResult<Option<String>> {
        self.wait_before_read();
        let inner = self.lock();
        if inner.fail_reads {
            return Err(AppError::Clipboard("模拟读取失败".to_string()));
        }
        Ok(inner.text.clone())
    }

    fn read_image(&mut self, priority: &[MediaType]) -> AppResult<Option<ImagePayload>> {
        self.wait_before_read();
        let inner = self.lock();
        if inner.fail_reads {
            return Err(AppError::Clipboard("模拟读取失败".to_string()));
        }
        Ok(priority.iter().find_map(|media_type| {
            inner.images.get(media_type).map(|bytes| ImagePayload {
                bytes: bytes.clone(),
                media_type: *media_type,
            })
        }))
    }

    fn write_text(&mut self, text: &str) -> AppResult<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(AppError::Clipboard("模拟写入失败".to_string()));
        }
        inner.text = Some(text.to_string());
        inner.images.clear();
        inner.version += 1;
        Ok(())
    }

    fn write_image(&mut self, bytes: &[u8], media_type: MediaType) -> AppResult<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(AppError::Clipboard("模拟写入失败".to_string()));
        }
        inner.text = None;
        inner.images.clear();
        inner.images.insert(media_type, bytes.to_vec());
        inner.version += 1;
        Ok(())
    }
}
