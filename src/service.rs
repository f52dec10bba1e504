//! 历史服务（单一所有者运行时）
//!
//! # 设计思路
//!
//! `HistoryStore` 与 `ChangeMonitor` 只由一个 tokio 任务（所有者任务）持有和修改：
//! - 剪贴板轮询、自动保存、定时推送都是所有者任务上的定时器分支
//! - 展示层通过 `HistoryHandle` 发送命令，结果经 `oneshot` 返回
//! - 剪贴板、磁盘与网络 I/O 在工作任务中执行，需要修改历史的结果以命令形式交回所有者任务
//!
//! 所有修改因此天然串行，不需要任何锁。
//!
//! # 实现思路
//!
//! - 持久化由独立的持久化任务按提交顺序执行（内部用 `spawn_blocking`），
//!   保证“清空文件”和之后的“保存快照”不会乱序。
//! - 剪贴板读取与写回同样由一个剪贴板任务按提交顺序执行，轮询时所有者任务只比较变化令牌。
//!   写回排在进行中的读取之后，读取不会读到写回的内容。
//! - 远端拉取在启动时执行一次，此后按 `syncIntervalSecs` 定时推送最新条目。
//! - 停止监控只取消后续轮询，进行中的持久化与同步照常完成。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::clipboard::{capture_item, write_item, ChangeMonitor, ClipboardSource, Detection, TickOutcome};
use crate::error::{AppError, AppResult};
use crate::history::{ClipboardItem, HistoryEvent, HistoryStore};
use crate::settings::Settings;
use crate::storage::LocalStorage;
use crate::sync::{RemoteStore, SyncReconciler};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

enum Command {
    GetAll(oneshot::Sender<Vec<ClipboardItem>>),
    Search(String, oneshot::Sender<Vec<ClipboardItem>>),
    Delete(Uuid, oneshot::Sender<bool>),
    Clear(oneshot::Sender<()>),
    CopyToSource(ClipboardItem, oneshot::Sender<AppResult<()>>),
    ClearAllData(oneshot::Sender<bool>),
    SaveNow(oneshot::Sender<bool>),
    SyncNow(oneshot::Sender<usize>),
    StopMonitoring(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
    /// 剪贴板任务读取到的内容
    Captured(Option<ClipboardItem>),
    /// 剪贴板任务完成写回
    Written {
        result: AppResult<()>,
        reply: oneshot::Sender<AppResult<()>>,
    },
    /// 工作任务拉取到的远端条目，由所有者任务合并
    RemoteFetched {
        items: Vec<ClipboardItem>,
        reply: Option<oneshot::Sender<usize>>,
    },
}

enum ClipboardJob {
    Capture,
    Write(ClipboardItem, oneshot::Sender<AppResult<()>>),
}

enum PersistJob {
    Save(Vec<ClipboardItem>, Option<oneshot::Sender<bool>>),
    Clear,
}

/// 历史服务入口
pub struct HistoryService;

impl HistoryService {
    /// 恢复本地快照、启动所有者任务，返回可克隆的句柄。
    ///
    /// `remote` 仅在 `cloudSyncEnabled` 为真时使用。
    pub async fn start<S>(
        settings: Settings,
        source: S,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> HistoryHandle
    where
        S: ClipboardSource + Clone + 'static,
    {
        let settings = settings.normalized();
        let mut store = HistoryStore::new(settings.max_history_items, settings.merge_ceiling);

        let storage = if settings.persistence_enabled {
            match settings.history_file() {
                Ok(path) => Some(LocalStorage::new(path)),
                Err(err) => {
                    log::warn!("无法确定历史快照路径，本次运行不持久化: {}", err);
                    None
                }
            }
        } else {
            None
        };

        if let Some(storage) = storage.clone() {
            match tokio::task::spawn_blocking(move || storage.load()).await {
                Ok(items) => store.restore(items),
                Err(err) => log::error!("恢复历史快照的任务失败: {}", err),
            }
        }

        let sync = match remote {
            Some(remote) if settings.cloud_sync_enabled => {
                Some(SyncReconciler::new(remote, settings.push_limit))
            }
            Some(_) => {
                log::info!("云同步未启用，忽略远端存储");
                None
            }
            None => None,
        };

        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let events = store.event_sender();
        let persistence = storage.map(spawn_persistence_worker);
        let clipboard = spawn_clipboard_worker(source.clone(), commands.downgrade());

        let owner = Owner {
            store,
            monitor: ChangeMonitor::new(source),
            clipboard,
            monitoring: true,
            persistence,
            sync,
            commands: commands.downgrade(),
        };
        tokio::spawn(owner.run(receiver, settings));

        log::info!("🚀 剪贴板历史服务已启动");
        HistoryHandle { commands, events }
    }
}

/// 展示层使用的读写接口
#[derive(Clone)]
pub struct HistoryHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<HistoryEvent>,
}

impl HistoryHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> AppResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| AppError::ServiceClosed)?;
        response.await.map_err(|_| AppError::ServiceClosed)
    }

    pub async fn get_all(&self) -> AppResult<Vec<ClipboardItem>> {
        self.request(Command::GetAll).await
    }

    pub async fn search(&self, query: &str) -> AppResult<Vec<ClipboardItem>> {
        let query = query.to_string();
        self.request(|reply| Command::Search(query, reply)).await
    }

    /// 订阅历史变更通知
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }

    /// 删除条目；启用同步时尽力删除远端同 id 记录。
    pub async fn delete(&self, id: Uuid) -> AppResult<bool> {
        self.request(|reply| Command::Delete(id, reply)).await
    }

    /// 清空本地历史并立即持久化。
    pub async fn clear(&self) -> AppResult<()> {
        self.request(Command::Clear).await
    }

    /// 把条目写回剪贴板，写回产生的变化不会再次入库。
    pub async fn copy_to_source(&self, item: &ClipboardItem) -> AppResult<()> {
        let item = item.clone();
        self.request(|reply| Command::CopyToSource(item, reply)).await?
    }

    /// 清空本地历史、删除快照并清空远端，返回远端是否清理成功。
    pub async fn clear_all_data(&self) -> AppResult<bool> {
        self.request(Command::ClearAllData).await
    }

    pub async fn save_now(&self) -> AppResult<bool> {
        self.request(Command::SaveNow).await
    }

    /// 立即拉取合并并推送，返回合并新增的条数。
    pub async fn sync_now(&self) -> AppResult<usize> {
        self.request(Command::SyncNow).await
    }

    pub async fn stop_monitoring(&self) -> AppResult<()> {
        self.request(Command::StopMonitoring).await
    }

    /// 保存最终快照后停止所有者任务。
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(Command::Shutdown).await
    }
}

fn spawn_persistence_worker(storage: LocalStorage) -> mpsc::UnboundedSender<PersistJob> {
    let (jobs, mut receiver) = mpsc::unbounded_channel::<PersistJob>();
    tokio::spawn(async move {
        while let Some(job) = receiver.recv().await {
            let storage = storage.clone();
            match job {
                PersistJob::Save(items, reply) => {
                    let saved = tokio::task::spawn_blocking(move || storage.save(&items))
                        .await
                        .unwrap_or_else(|err| {
                            log::error!("保存任务异常退出: {}", err);
                            false
                        });
                    if let Some(reply) = reply {
                        let _ = reply.send(saved);
                    }
                }
                PersistJob::Clear => {
                    if let Err(err) = tokio::task::spawn_blocking(move || storage.clear()).await {
                        log::error!("删除快照任务异常退出: {}", err);
                    }
                }
            }
        }
        log::debug!("持久化任务已退出");
    });
    jobs
}

fn spawn_clipboard_worker<S>(
    source: S,
    commands: mpsc::WeakSender<Command>,
) -> mpsc::UnboundedSender<ClipboardJob>
where
    S: ClipboardSource + Clone + 'static,
{
    let (jobs, mut receiver) = mpsc::unbounded_channel::<ClipboardJob>();
    tokio::spawn(async move {
        while let Some(job) = receiver.recv().await {
            let mut source = source.clone();
            let command = match job {
                ClipboardJob::Capture => {
                    let item = tokio::task::spawn_blocking(move || capture_item(&mut source))
                        .await
                        .unwrap_or_else(|err| {
                            log::error!("读取剪贴板的任务异常退出: {}", err);
                            None
                        });
                    Command::Captured(item)
                }
                ClipboardJob::Write(item, reply) => {
                    let result = tokio::task::spawn_blocking(move || write_item(&mut source, &item))
                        .await
                        .unwrap_or_else(|err| {
                            Err(AppError::Clipboard(format!("写回剪贴板的任务异常退出: {}", err)))
                        });
                    Command::Written { result, reply }
                }
            };

            let Some(commands) = commands.upgrade() else {
                break;
            };
            if commands.send(command).await.is_err() {
                break;
            }
        }
        log::debug!("剪贴板任务已退出");
    });
    jobs
}

fn delayed_interval(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

struct Owner<S: ClipboardSource> {
    store: HistoryStore,
    monitor: ChangeMonitor<S>,
    clipboard: mpsc::UnboundedSender<ClipboardJob>,
    monitoring: bool,
    persistence: Option<mpsc::UnboundedSender<PersistJob>>,
    sync: Option<SyncReconciler>,
    /// 弱引用，所有句柄释放后命令通道随之关闭
    commands: mpsc::WeakSender<Command>,
}

impl<S: ClipboardSource + Clone + 'static> Owner<S> {
    async fn run(mut self, mut receiver: mpsc::Receiver<Command>, settings: Settings) {
        let mut poll = delayed_interval(settings.poll_interval());
        let mut autosave = delayed_interval(settings.autosave_interval());
        let mut push = delayed_interval(settings.sync_interval());

        if self.sync.is_some() {
            self.spawn_pull(None);
        }

        let shutdown_reply = loop {
            tokio::select! {
                _ = poll.tick(), if self.monitoring => self.poll_clipboard(),
                _ = autosave.tick(), if self.persistence.is_some() => {
                    self.persist(None);
                }
                _ = push.tick(), if self.sync.is_some() => {
                    self.spawn_push();
                }
                command = receiver.recv() => match command {
                    Some(Command::Shutdown(reply)) => break Some(reply),
                    Some(command) => self.handle(command),
                    None => break None,
                },
            }
        };

        if self.persistence.is_some() {
            let (reply, saved) = oneshot::channel();
            self.persist(Some(reply));
            let _ = saved.await;
        }
        log::info!("👋 剪贴板历史服务已停止");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::GetAll(reply) => {
                let _ = reply.send(self.store.snapshot().to_vec());
            }
            Command::Search(query, reply) => {
                let _ = reply.send(self.store.search(&query));
            }
            Command::Delete(id, reply) => {
                let removed = self.store.delete(id);
                if let Some(sync) = self.sync.clone() {
                    tokio::spawn(async move {
                        sync.delete_remote(id).await;
                    });
                }
                let _ = reply.send(removed);
            }
            Command::Clear(reply) => {
                self.store.clear();
                self.persist(None);
                let _ = reply.send(());
            }
            Command::CopyToSource(item, reply) => {
                self.monitor.mark_self_initiated_write();
                if let Err(mpsc::error::SendError(ClipboardJob::Write(_, reply))) =
                    self.clipboard.send(ClipboardJob::Write(item, reply))
                {
                    let result = Err(AppError::ServiceClosed);
                    self.monitor.finish_write(&result);
                    let _ = reply.send(result);
                }
            }
            Command::Captured(item) => {
                // 停止监控后到达的读取结果不再入库
                let item = if self.monitoring { item } else { None };
                if let TickOutcome::Added(id) = self.monitor.finish_capture(&mut self.store, item) {
                    log::debug!("新条目已入库: {}", id);
                }
            }
            Command::Written { result, reply } => {
                self.monitor.finish_write(&result);
                let _ = reply.send(result);
            }
            Command::ClearAllData(reply) => self.clear_all_data(reply),
            Command::SaveNow(reply) => {
                if self.persistence.is_some() {
                    self.persist(Some(reply));
                } else {
                    let _ = reply.send(false);
                }
            }
            Command::SyncNow(reply) => {
                if self.sync.is_some() {
                    self.spawn_pull(Some(reply));
                } else {
                    let _ = reply.send(0);
                }
            }
            Command::StopMonitoring(reply) => {
                self.monitoring = false;
                log::info!("⏸️  已停止剪贴板监控");
                let _ = reply.send(());
            }
            Command::RemoteFetched { items, reply } => {
                let added = self.store.merge_remote(items);
                if added > 0 {
                    self.persist(None);
                }
                // 手动同步在合并后立即推送
                if let Some(reply) = reply {
                    self.spawn_push();
                    let _ = reply.send(added);
                }
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn poll_clipboard(&mut self) {
        if self.monitor.detect() != Detection::Changed {
            return;
        }
        if self.clipboard.send(ClipboardJob::Capture).is_err() {
            log::error!("剪贴板任务已退出，本次变化被丢弃");
            self.monitor.finish_capture(&mut self.store, None);
        }
    }

    fn clear_all_data(&mut self, reply: oneshot::Sender<bool>) {
        self.store.clear();
        if let Some(jobs) = &self.persistence {
            let _ = jobs.send(PersistJob::Clear);
        }

        match self.sync.clone() {
            Some(sync) => {
                tokio::spawn(async move {
                    let cleared = sync.clear_remote().await;
                    if cleared {
                        log::info!("✅ 本地与远端数据已全部清除");
                    } else {
                        log::warn!("⚠️  远端数据清除失败");
                    }
                    let _ = reply.send(cleared);
                });
            }
            None => {
                let _ = reply.send(false);
            }
        }
    }

    fn persist(&self, reply: Option<oneshot::Sender<bool>>) {
        match &self.persistence {
            Some(jobs) => {
                let snapshot = self.store.snapshot().to_vec();
                if jobs.send(PersistJob::Save(snapshot, reply)).is_err() {
                    log::error!("持久化任务已退出，本次保存被丢弃");
                }
            }
            None => {
                if let Some(reply) = reply {
                    let _ = reply.send(false);
                }
            }
        }
    }

    fn spawn_pull(&self, reply: Option<oneshot::Sender<usize>>) {
        let Some(sync) = self.sync.clone() else {
            return;
        };
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let items = sync.pull().await;
            if commands
                .send(Command::RemoteFetched { items, reply })
                .await
                .is_err()
            {
                log::debug!("服务已停止，丢弃远端拉取结果");
            }
        });
    }

    fn spawn_push(&self) {
        let Some(sync) = self.sync.clone() else {
            return;
        };
        let batch = sync.recent_batch(&self.store);
        tokio::spawn(async move {
            sync.push(batch).await;
        });
    }
}
