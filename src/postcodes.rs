//! postcodes.io 一括ルックアップ
//!
//! `POST /postcodes` に最大100件の郵便番号を送り、
//! 入力1件ごとに `{query, result|null}` を受け取る。

use crate::error::{PipelineError, Result};
use crate::http;
use crate::resolver::{BulkLookup, LookupOutcome, LookupPair};
use async_trait::async_trait;
use carehome_common::GeoPoint;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// APIの上限
pub const MAX_BATCH: usize = 100;

#[derive(Serialize)]
struct BulkRequest<'a> {
    postcodes: &'a [String],
}

#[derive(Deserialize)]
struct BulkResponse {
    status: Option<u16>,
    result: Option<Vec<Value>>,
}

pub struct PostcodesClient {
    client: Client,
    url: String,
}

impl PostcodesClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

/// 応答の1項目を解釈する
///
/// `query` が無い項目はどのキーの応答か判別できないため捨てる
fn parse_item(item: &Value) -> Option<LookupPair> {
    let query = item.get("query")?.as_str()?.to_string();

    let outcome = match item.get("result") {
        None | Some(Value::Null) => LookupOutcome::NotFound,
        Some(result) => {
            let lat = result.get("latitude").and_then(Value::as_f64);
            let lng = result.get("longitude").and_then(Value::as_f64);
            match (lat, lng) {
                (Some(lat), Some(lng)) => LookupOutcome::Found(GeoPoint {
                    lat,
                    lng,
                    region: result.get("region").and_then(Value::as_str).map(str::to_string),
                    admin_district: result
                        .get("admin_district")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }),
                _ => LookupOutcome::Malformed("latitude/longitudeがありません".into()),
            }
        }
    };

    Some(LookupPair { query, outcome })
}

#[async_trait]
impl BulkLookup for PostcodesClient {
    async fn lookup(&self, keys: &[String]) -> Result<Vec<LookupPair>> {
        debug!(count = keys.len(), "postcodes.io 問い合わせ");

        let response = self
            .client
            .post(&self.url)
            .json(&BulkRequest { postcodes: keys })
            .send()
            .await?;

        let response = http::ensure_success(response).await?;
        let body: BulkResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;

        if let Some(status) = body.status {
            if status != 200 {
                return Err(PipelineError::RemoteRejection {
                    status,
                    body: "status != 200".into(),
                });
            }
        }

        let items = body
            .result
            .ok_or_else(|| PipelineError::MalformedResponse("resultがありません".into()))?;

        Ok(items.iter().filter_map(parse_item).collect())
    }

    fn answers_every_key(&self) -> bool {
        true
    }
}
