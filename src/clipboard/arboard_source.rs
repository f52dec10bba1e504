//! 系统剪贴板实现（基于 arboard + clipboard-master）
//!
//! ## 实现思路
//!
//! - 变化令牌由后台监听线程维护：`clipboard-master` 每收到一次系统变化通知，
//!   共享的 `AtomicU64` 代数加一，`current_version` 只是一次原子读取，轮询时不读取内容。
//! - 本进程写回剪贴板同样会触发通知，由监控器的 `IgnoreState` 吸收。
//! - 内容读写由 arboard 完成，都是阻塞调用，服务层把它们放到阻塞线程池执行。
//! - arboard 读取到的图片是 RGBA 像素，统一编码为 PNG 后入库，
//!   写回时再用 `image` 解码成 RGBA。每次操作都重新打开剪贴板，
//!   不跨线程持有平台句柄。
//! - 监听线程退出后按指数退避重启。

use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use clipboard_master::{CallbackResult, ClipboardHandler, Master};
use image::{DynamicImage, ImageFormat};

use super::source::{ChangeVersion, ClipboardSource, ImagePayload};
use crate::error::{AppError, AppResult};
use crate::history::MediaType;

const LISTENER_RESTART_BASE_DELAY_MS: u64 = 100;
const LISTENER_RESTART_MAX_DELAY_MS: u64 = 5_000;

/// 操作系统剪贴板。克隆出的实例共享同一个变化代数。
#[derive(Debug, Clone)]
pub struct ArboardSource {
    generation: Arc<AtomicU64>,
}

impl ArboardSource {
    /// 确认当前环境存在可用的剪贴板，并启动变化监听线程。
    pub fn new() -> AppResult<Self> {
        open()?;
        let generation = Arc::new(AtomicU64::new(0));
        spawn_listener(Arc::clone(&generation))?;
        Ok(Self { generation })
    }
}

/// 监听线程上的回调，只负责推进代数
struct ChangeCounter {
    generation: Arc<AtomicU64>,
}

impl ClipboardHandler for ChangeCounter {
    fn on_clipboard_change(&mut self) -> CallbackResult {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        log::trace!("📋 剪贴板变化通知，代数 {}", generation);
        CallbackResult::Next
    }

    fn on_clipboard_error(&mut self, error: std::io::Error) -> CallbackResult {
        log::error!("剪贴板监听错误：{}", error);
        CallbackResult::Next
    }
}

fn restart_backoff_ms(attempt: u32) -> u64 {
    let exp = 1_u64 << attempt.saturating_sub(1).min(6);
    LISTENER_RESTART_BASE_DELAY_MS
        .saturating_mul(exp)
        .min(LISTENER_RESTART_MAX_DELAY_MS)
}

fn spawn_listener(generation: Arc<AtomicU64>) -> AppResult<()> {
    thread::Builder::new()
        .name("clipboard-listener".to_string())
        .spawn(move || {
            let mut attempt: u32 = 0;
            loop {
                let handler = ChangeCounter {
                    generation: Arc::clone(&generation),
                };
                match Master::new(handler) {
                    Ok(mut master) => {
                        attempt = 0;
                        log::info!("📋 剪贴板监听已启动");
                        if let Err(err) = master.run() {
                            log::warn!("📋 剪贴板监听异常结束: {}", err);
                        }
                        log::warn!("📋 剪贴板监听已退出，将尝试重启");
                    }
                    Err(err) => {
                        log::error!("📋 创建剪贴板监听失败: {}", err);
                    }
                }

                attempt = attempt.saturating_add(1);
                let backoff_ms = restart_backoff_ms(attempt);
                log::warn!("📋 剪贴板监听 {}ms 后重试（attempt={}）", backoff_ms, attempt);
                thread::sleep(Duration::from_millis(backoff_ms));
            }
        })?;
    Ok(())
}

fn open() -> AppResult<arboard::Clipboard> {
    arboard::Clipboard::new().map_err(|e| AppError::Clipboard(e.to_string()))
}

/// `ContentNotAvailable` 视为“没有该类型内容”，其余错误向上传递。
fn absent_ok<T>(result: Result<T, arboard::Error>) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(err) => Err(AppError::Clipboard(err.to_string())),
    }
}

fn encode_png(image: arboard::ImageData<'_>) -> AppResult<Vec<u8>> {
    let rgba = image::RgbaImage::from_raw(
        image.width as u32,
        image.height as u32,
        image.bytes.into_owned(),
    )
    .ok_or_else(|| AppError::Clipboard("创建图像缓冲区失败".to_string()))?;

    let mut encoded = Vec::new();
    DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .map_err(|e| AppError::Clipboard(format!("PNG 编码失败: {}", e)))?;
    Ok(encoded)
}

fn decode_format(media_type: MediaType) -> AppResult<ImageFormat> {
    match media_type {
        MediaType::Png => Ok(ImageFormat::Png),
        MediaType::Tiff => Ok(ImageFormat::Tiff),
        MediaType::Jpeg => Ok(ImageFormat::Jpeg),
        other => Err(AppError::Clipboard(format!(
            "不支持写回 {} 格式的图片",
            other.as_str()
        ))),
    }
}

impl ClipboardSource for ArboardSource {
    fn current_version(&mut self) -> AppResult<ChangeVersion> {
        Ok(ChangeVersion(self.generation.load(Ordering::Acquire)))
    }

    fn read_text(&mut self) -> AppResult<Option<String>> {
        absent_ok(open()?.get_text())
    }

    fn read_image(&mut self, priority: &[MediaType]) -> AppResult<Option<ImagePayload>> {
        // arboard 只暴露 RGBA 像素，这里统一按 PNG 表示
        if !priority.contains(&MediaType::Png) {
            return Ok(None);
        }
        let Some(image) = absent_ok(open()?.get_image())? else {
            return Ok(None);
        };
        Ok(Some(ImagePayload {
            bytes: encode_png(image)?,
            media_type: MediaType::Png,
        }))
    }

    fn write_text(&mut self, text: &str) -> AppResult<()> {
        open()?
            .set_text(text.to_string())
            .map_err(|e| AppError::Clipboard(e.to_string()))
    }

    fn write_image(&mut self, bytes: &[u8], media_type: MediaType) -> AppResult<()> {
        let format = decode_format(media_type)?;
        let rgba = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| AppError::Clipboard(format!("解码图片失败: {}", e)))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();

        let image_data = arboard::ImageData {
            width: width as usize,
            height: height as usize,
            bytes: Cow::Owned(rgba.into_raw()),
        };
        open()?
            .set_image(image_data)
            .map_err(|e| AppError::Clipboard(e.to_string()))
    }
}
