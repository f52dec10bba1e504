//! 进程内远端存储，用于测试与离线运行

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::remote::{RemoteRecord, RemoteStore};
use crate::error::{AppError, AppResult};

#[derive(Debug)]
pub struct MemoryRemoteStore {
    records: Mutex<Vec<RemoteRecord>>,
    available: AtomicBool,
    fail_requests: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            fail_requests: AtomicBool::new(false),
            upsert_calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置远端记录（保持传入顺序，不分配 `created_at`）
    pub fn with_records(records: Vec<RemoteRecord>) -> Self {
        let store = Self::default();
        *store.lock() = records;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RemoteRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 让后续请求全部返回错误，模拟网络故障。
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<RemoteRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> AppResult<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(AppError::Remote("模拟远端不可达".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn fetch_all(&self) -> AppResult<Vec<RemoteRecord>> {
        self.check()?;
        Ok(self.records())
    }

    async fn upsert(&self, incoming: Vec<RemoteRecord>) -> AppResult<()> {
        self.check()?;
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now();
        let mut records = self.lock();
        for mut record in incoming {
            match records.iter_mut().find(|r| r.item.id == record.item.id) {
                Some(existing) => {
                    record.created_at = existing.created_at;
                    *existing = record;
                }
                None => {
                    record.created_at = Some(now);
                    records.push(record);
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.check()?;
        self.lock().retain(|r| r.item.id != id);
        Ok(())
    }

    async fn delete_all(&self) -> AppResult<()> {
        self.check()?;
        self.lock().clear();
        Ok(())
    }
}
