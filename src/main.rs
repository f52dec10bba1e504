//! # 剪贴板历史同步：命令行入口
//!
//! `run` 以守护方式运行监控、自动保存与同步，其余子命令直接读写本地快照。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clipboard_history_sync::clipboard::ArboardSource;
use clipboard_history_sync::error::{AppError, AppResult};
use clipboard_history_sync::history::{ClipboardItem, HistoryEvent, HistoryStore, QueryService};
use clipboard_history_sync::service::HistoryService;
use clipboard_history_sync::settings::Settings;
use clipboard_history_sync::storage::LocalStorage;
use clipboard_history_sync::sync::{HttpRemoteStore, RemoteStore, SyncReconciler};

#[derive(Parser)]
#[command(name = "clipboard-history-sync")]
#[command(about = "Clipboard history with local persistence and remote sync", long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the clipboard until Ctrl-C
    Run,
    /// Print the saved history, newest first
    List {
        /// Show at most N items
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Search the saved history
    Search {
        query: String,
    },
    /// Delete the local history snapshot
    Clear,
    /// Delete the local snapshot and all remote records
    Reset,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from_path(path),
        None => Settings::load(),
    };

    if let Err(err) = execute(cli.command, settings).await {
        log::error!("{err}");
        std::process::exit(1);
    }
}

async fn execute(command: Commands, settings: Settings) -> AppResult<()> {
    match command {
        Commands::Run => run(settings).await,
        Commands::List { limit } => {
            let store = load_store(&settings)?;
            let limit = limit.unwrap_or(store.len());
            for (index, item) in store.recent(limit).iter().enumerate() {
                print_item(index, item);
            }
            Ok(())
        }
        Commands::Search { query } => {
            let store = load_store(&settings)?;
            for (index, item) in QueryService.search(&store, &query).iter().enumerate() {
                print_item(index, item);
            }
            Ok(())
        }
        Commands::Clear => {
            let storage = LocalStorage::new(settings.history_file()?);
            if !storage.clear() {
                return Err(AppError::Storage("删除本地快照失败".to_string()));
            }
            println!("本地历史已清空");
            Ok(())
        }
        Commands::Reset => {
            let storage = LocalStorage::new(settings.history_file()?);
            let local_cleared = storage.clear();
            let remote_cleared = match build_remote(&settings)? {
                Some(remote) => SyncReconciler::new(remote, settings.push_limit).clear_remote().await,
                None => false,
            };
            println!("本地: {} / 远端: {}", status(local_cleared), status(remote_cleared));
            Ok(())
        }
    }
}

async fn run(settings: Settings) -> AppResult<()> {
    let source = ArboardSource::new()?;
    let remote = build_remote(&settings)?;
    let handle = HistoryService::start(settings, source, remote).await;

    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(HistoryEvent::Updated { len }) = events.recv().await {
            log::debug!("历史已更新，共 {} 条", len);
        }
    });

    tokio::signal::ctrl_c().await?;
    log::info!("收到退出信号，正在保存历史...");
    handle.shutdown().await
}

fn build_remote(settings: &Settings) -> AppResult<Option<Arc<dyn RemoteStore>>> {
    if !settings.cloud_sync_enabled {
        return Ok(None);
    }
    match &settings.remote {
        Some(remote) => {
            let store: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::new(remote)?);
            Ok(Some(store))
        }
        None => {
            log::warn!("已启用云同步但未配置 remote，跳过远端");
            Ok(None)
        }
    }
}

fn load_store(settings: &Settings) -> AppResult<HistoryStore> {
    let storage = LocalStorage::new(settings.history_file()?);
    let mut store = HistoryStore::new(settings.max_history_items, settings.merge_ceiling);
    store.restore(storage.load());
    Ok(store)
}

fn print_item(index: usize, item: &ClipboardItem) {
    println!(
        "{:>3}. [{}] {} {}",
        index + 1,
        item.kind().as_str(),
        item.timestamp().format("%Y-%m-%d %H:%M:%S"),
        item.preview()
    );
}

fn status(ok: bool) -> &'static str {
    if ok { "已清除" } else { "未清除" }
}
