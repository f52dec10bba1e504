//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 剪贴板读写、快照文件、远端请求与配置解析的失败都归入同一个 `AppError`，
//! 调用方只需要处理一种错误类型。
//!
//! 核心组件（监控、存储、同步）均返回 `Result<T, AppError>`，
//! 由单一所有者任务（`service`）负责记录日志并在下一个周期重试，
//! 错误永远不会导致进程退出。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `std::io::Error`、`serde_json::Error` 提供 `From` 转换，配合 `?` 使用。
//! - 远端错误统一收敛为 `Remote`，调用方无需关心具体后端。

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 剪贴板读写操作失败
    #[error("剪贴板操作失败: {0}")]
    Clipboard(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 本地快照不可用或无法写入
    #[error("存储不可用: {0}")]
    Storage(String),

    /// JSON 序列化 / 反序列化失败
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 远端存储不可达或返回错误
    #[error("远端同步失败: {0}")]
    Remote(String),

    /// 配置文件无效
    #[error("配置错误: {0}")]
    Settings(String),

    /// 所有者任务已退出，命令无法送达
    #[error("历史服务已停止")]
    ServiceClosed,
}

pub type AppResult<T> = Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Remote(err.to_string())
    }
}
