//! HTTPクライアント共通処理

use crate::error::{PipelineError, Result};
use reqwest::{Client, Response};
use std::time::Duration;

/// エラーメッセージに含めるレスポンス本文の最大文字数
pub const ERROR_BODY_CHARS: usize = 100;

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::Config(format!("HTTPクライアント初期化エラー: {}", e)))
}

/// 文字数で切り詰め（マルチバイト安全）
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// 2xx以外はRemoteRejectionに変換
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::RemoteRejection {
        status: status.as_u16(),
        body: truncate_chars(&body, ERROR_BODY_CHARS),
    })
}
