//! Supabase REST / Edge Function クライアント
//!
//! - 未エンリッチIDの取得（RPC）
//! - CQCエンリッチ（Edge Function）
//! - 施設テーブルへのupsert
//! - 座標一括更新（RPC）

use crate::config::{Config, SupabaseCredentials};
use crate::coords::CoordinateSink;
use crate::enricher::{Enrich, Worklist};
use crate::error::{PipelineError, Result};
use crate::http::{self, truncate_chars, ERROR_BODY_CHARS};
use crate::upload::UpsertSink;
use async_trait::async_trait;
use carehome_common::{CoordinateUpdate, FacilityRow};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// 呼び出し先の名前
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub table: String,
    pub worklist_rpc: String,
    pub enrich_function: String,
    pub coords_rpc: String,
}

impl Endpoints {
    pub fn from_config(config: &Config) -> Self {
        Self {
            table: config.upload.table.clone(),
            worklist_rpc: config.enrich.worklist_rpc.clone(),
            enrich_function: config.enrich.function_name.clone(),
            coords_rpc: config.coords.rpc.clone(),
        }
    }
}

#[derive(Deserialize)]
struct WorklistRow {
    location_id: String,
}

pub struct SupabaseClient {
    client: Client,
    credentials: SupabaseCredentials,
    endpoints: Endpoints,
}

impl SupabaseClient {
    pub fn new(client: Client, credentials: SupabaseCredentials, endpoints: Endpoints) -> Self {
        Self {
            client,
            credentials,
            endpoints,
        }
    }

    pub fn from_config(client: Client, config: &Config) -> Result<Self> {
        Ok(Self::new(client, config.supabase()?, Endpoints::from_config(config)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.credentials.url, path);
        self.client
            .post(url)
            .header("apikey", &self.credentials.key)
            .bearer_auth(&self.credentials.key)
    }

    fn rpc(&self, name: &str) -> RequestBuilder {
        self.post(&format!("rest/v1/rpc/{}", name))
    }
}

#[async_trait]
impl Worklist for SupabaseClient {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<String>> {
        let response = self
            .rpc(&self.endpoints.worklist_rpc)
            .json(&json!({ "max_count": limit }))
            .send()
            .await
            .map_err(|e| PipelineError::WorklistFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::WorklistFetch(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_chars(&body, ERROR_BODY_CHARS)
            )));
        }

        let rows: Vec<WorklistRow> = response
            .json()
            .await
            .map_err(|e| PipelineError::WorklistFetch(format!("レスポンス形式が不正: {}", e)))?;

        debug!(count = rows.len(), "未エンリッチID取得");
        Ok(rows.into_iter().map(|r| r.location_id).collect())
    }
}

#[async_trait]
impl Enrich for SupabaseClient {
    async fn enrich(&self, id: &str) -> Result<Option<String>> {
        let response = self
            .post(&format!("functions/v1/{}", self.endpoints.enrich_function))
            .json(&json!({ "locationId": id }))
            .send()
            .await?;

        let response = http::ensure_success(response).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;

        Ok(data.get("name").and_then(Value::as_str).map(str::to_string))
    }
}

#[async_trait]
impl UpsertSink for SupabaseClient {
    async fn upsert(&self, rows: &[FacilityRow]) -> Result<()> {
        let response = self
            .post(&format!("rest/v1/{}", self.endpoints.table))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;

        http::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl CoordinateSink for SupabaseClient {
    async fn update_coordinates(&self, updates: &[CoordinateUpdate]) -> Result<()> {
        let response = self
            .rpc(&self.endpoints.coords_rpc)
            .json(&json!({ "updates": updates }))
            .send()
            .await?;

        http::ensure_success(response).await?;
        Ok(())
    }
}
