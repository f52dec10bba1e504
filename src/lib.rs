//! # 剪贴板历史同步：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │             展示层 / CLI（HistoryHandle 调用方）           │
//! │   get_all · search · subscribe · delete · clear ·        │
//! │   copy_to_source · clear_all_data · sync_now             │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ mpsc 命令 + oneshot 回执 / broadcast 变更通知
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕        service（单一所有者 tokio 任务）           │
//! │                                                          │
//! │  clipboard ── ChangeMonitor (500ms 轮询 + IgnoreState)   │
//! │      │            ↓ add                                  │
//! │      │        history ── HistoryStore + QueryService     │
//! │      │            ↓ snapshot        ↑ merge_remote       │
//! │      │        storage (30s)     sync (启动拉取 / 5min 推送)│
//! │      │        JSON 快照         RemoteStore: HTTP / 内存  │
//! │      └─ ClipboardSource: arboard / 内存                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`history`] | 条目数据模型、有界去重历史、搜索 |
//! | [`clipboard`] | 剪贴板数据源抽象、变化监控、自写入屏蔽 |
//! | [`storage`] | 本地 JSON 全量快照的读写与删除 |
//! | [`sync`] | 远端存储契约、HTTP / 内存后端、拉取合并与推送 |
//! | [`settings`] | `settings.json` 配置加载与范围夹紧 |
//! | [`service`] | 所有者任务、定时器调度、对外句柄 |

pub mod error;
pub mod history;
pub mod clipboard;
pub mod storage;
pub mod sync;
pub mod settings;
pub mod service;
