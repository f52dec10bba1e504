//! 配置模块
//!
//! # 设计思路
//!
//! 配置保存在平台配置目录下的 `settings.json`（camelCase 键名）：
//! - 文件不存在或无法解析时回退到默认值，配置问题永远不会阻止启动
//! - 所有数值读入后统一夹紧到安全范围（`normalize_*`）
//!
//! # 实现思路
//!
//! - 平台目录由 `directories::ProjectDirs` 解析，`dataDir` 可覆盖数据目录。
//! - 缺失的键由 `#[serde(default)]` 补齐，旧版配置文件可以直接读取。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::history::{DEFAULT_MAX_HISTORY_ITEMS, DEFAULT_MERGE_CEILING};
use crate::sync::DEFAULT_PUSH_LIMIT;

const MAX_HISTORY_ITEMS_RANGE: (usize, usize) = (1, 1000);
const MERGE_CEILING_MAX: usize = 10_000;
const POLL_INTERVAL_MS_RANGE: (u64, u64) = (50, 5_000);
const AUTOSAVE_INTERVAL_SECS_RANGE: (u64, u64) = (5, 3_600);
const SYNC_INTERVAL_SECS_RANGE: (u64, u64) = (30, 86_400);
const PUSH_LIMIT_RANGE: (usize, usize) = (1, 1000);
const REMOTE_TIMEOUT_SECS_RANGE: (u64, u64) = (1, 300);

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 15;

const SETTINGS_FILE_NAME: &str = "settings.json";
const HISTORY_FILE_NAME: &str = "history.json";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "clipboard-history", "clipboard-history-sync")
}

fn normalize_max_history_items(value: usize) -> usize {
    value.clamp(MAX_HISTORY_ITEMS_RANGE.0, MAX_HISTORY_ITEMS_RANGE.1)
}

fn normalize_merge_ceiling(value: usize, max_history_items: usize) -> usize {
    value.clamp(max_history_items, MERGE_CEILING_MAX)
}

fn normalize_poll_interval_ms(value: u64) -> u64 {
    value.clamp(POLL_INTERVAL_MS_RANGE.0, POLL_INTERVAL_MS_RANGE.1)
}

fn normalize_autosave_interval_secs(value: u64) -> u64 {
    value.clamp(AUTOSAVE_INTERVAL_SECS_RANGE.0, AUTOSAVE_INTERVAL_SECS_RANGE.1)
}

fn normalize_sync_interval_secs(value: u64) -> u64 {
    value.clamp(SYNC_INTERVAL_SECS_RANGE.0, SYNC_INTERVAL_SECS_RANGE.1)
}

fn normalize_push_limit(value: usize) -> usize {
    value.clamp(PUSH_LIMIT_RANGE.0, PUSH_LIMIT_RANGE.1)
}

fn default_remote_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

/// 远端存储连接参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSettings {
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 应用配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub max_history_items: usize,
    pub merge_ceiling: usize,
    pub poll_interval_ms: u64,
    pub autosave_interval_secs: u64,
    pub sync_interval_secs: u64,
    pub push_limit: usize,
    pub persistence_enabled: bool,
    pub cloud_sync_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
            merge_ceiling: DEFAULT_MERGE_CEILING,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            push_limit: DEFAULT_PUSH_LIMIT,
            persistence_enabled: true,
            cloud_sync_enabled: false,
            data_dir: None,
            remote: None,
        }
    }
}

impl Settings {
    /// 平台默认的配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
    }

    /// 从默认路径读取配置，无法定位配置目录时使用默认值。
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from_path(&path),
            None => {
                log::warn!("无法定位配置目录，使用默认配置");
                Self::default()
            }
        }
    }

    /// 读取并夹紧配置；文件不存在或格式错误时回退到默认值。
    pub fn load_from_path(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<Settings>(&content) {
                    Ok(settings) => return settings.normalized(),
                    Err(err) => log::warn!("解析配置文件失败，使用默认配置: {}", err),
                },
                Err(err) => log::warn!("读取配置文件失败，使用默认配置: {}", err),
            }
        }
        Self::default()
    }

    pub fn save_to_path(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Settings(format!("创建配置目录失败: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Settings(format!("序列化配置失败: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| AppError::Settings(format!("写入配置文件失败: {}", e)))?;
        Ok(())
    }

    /// 把所有数值夹紧到允许范围。
    pub fn normalized(mut self) -> Self {
        self.max_history_items = normalize_max_history_items(self.max_history_items);
        self.merge_ceiling = normalize_merge_ceiling(self.merge_ceiling, self.max_history_items);
        self.poll_interval_ms = normalize_poll_interval_ms(self.poll_interval_ms);
        self.autosave_interval_secs = normalize_autosave_interval_secs(self.autosave_interval_secs);
        self.sync_interval_secs = normalize_sync_interval_secs(self.sync_interval_secs);
        self.push_limit = normalize_push_limit(self.push_limit);
        if let Some(remote) = self.remote.as_mut() {
            remote.timeout_secs = remote
                .timeout_secs
                .clamp(REMOTE_TIMEOUT_SECS_RANGE.0, REMOTE_TIMEOUT_SECS_RANGE.1);
        }
        self
    }

    /// 历史快照文件路径：优先 `dataDir`，否则为平台数据目录。
    pub fn history_file(&self) -> AppResult<PathBuf> {
        if let Some(dir) = self.data_dir.as_ref().filter(|dir| !dir.as_os_str().is_empty()) {
            return Ok(dir.join(HISTORY_FILE_NAME));
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join(HISTORY_FILE_NAME))
            .ok_or_else(|| AppError::Settings("无法定位应用数据目录".to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
