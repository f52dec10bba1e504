//! REST 远端存储
//!
//! ## 接口约定
//! - `GET    {base}/health`     可用性探测，2xx 视为可用
//! - `GET    {base}/items`      返回 `RemoteRecord` 数组
//! - `PUT    {base}/items`      以数组形式按 id 覆盖写入
//! - `DELETE {base}/items/{id}` 删除单条，404 视为成功
//! - `DELETE {base}/items`      删除全部
//!
//! 配置了 `apiToken` 时以 Bearer 方式携带。

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use uuid::Uuid;

use super::remote::{RemoteRecord, RemoteStore};
use crate::error::AppResult;
use crate::settings::RemoteSettings;

pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(settings: &RemoteSettings) -> AppResult<Self> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_token: settings.api_token.clone().filter(|token| !token.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn is_available(&self) -> bool {
        let request = self.authorized(self.client.get(self.url("health")));
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                log::debug!("远端可用性探测失败: {}", err);
                false
            }
        }
    }

    async fn fetch_all(&self) -> AppResult<Vec<RemoteRecord>> {
        let response = self
            .authorized(self.client.get(self.url("items")))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Vec<RemoteRecord>>().await?)
    }

    async fn upsert(&self, records: Vec<RemoteRecord>) -> AppResult<()> {
        self.authorized(self.client.put(self.url("items")))
            .json(&records)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let response = self
            .authorized(self.client.delete(self.url(&format!("items/{}", id))))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    async fn delete_all(&self) -> AppResult<()> {
        self.authorized(self.client.delete(self.url("items")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
