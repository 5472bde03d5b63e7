//! 継続バッチエンリッチ
//!
//! リモートストアから未エンリッチのIDを上限件数ずつ取得し、
//! 1件ずつエンリッチAPIを呼ぶ。取得結果が0件になるまで繰り返す。
//!
//! 完了判定はリモートストア側（エンリッチ済みのIDは次回以降の
//! 取得結果に含まれない）に委ねる。取得の失敗は完了と区別して
//! エラーとして返す。

mod progress;

pub use progress::ProgressReport;

use crate::error::{PipelineError, Result};
use crate::http::truncate_chars;
use crate::ratelimit::RateLimiter;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 失敗メッセージの最大文字数
const ERROR_MESSAGE_CHARS: usize = 100;

/// 未エンリッチIDの取得
#[async_trait]
pub trait Worklist: Send + Sync {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<String>>;
}

/// 1件のエンリッチ（成功時は表示名を返すことがある）
#[async_trait]
pub trait Enrich: Send + Sync {
    async fn enrich(&self, id: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// 1回の取得の上限件数
    pub limit: usize,
    /// 進捗表示の間隔（件数）
    pub report_every: usize,
    /// 取得回数の上限（Noneなら0件になるまで）
    pub max_batches: Option<usize>,
}

/// 1回の取得分の集計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub number: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// 実行全体の集計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichSummary {
    /// 取得APIの呼び出し回数（最後の0件を含む）
    pub pulls: usize,
    pub batches: Vec<BatchSummary>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
    /// 0件の取得で終了したか（上限到達ならfalse）
    pub completed: bool,
}

/// 取得が0件になるまでエンリッチを繰り返す
///
/// # Arguments
/// * `worklist` - 未エンリッチIDの取得元
/// * `enricher` - 1件ずつのエンリッチAPI
/// * `limiter` - 各エンリッチ呼び出し前に取得するレート制限
/// * `options` - 取得件数・進捗表示間隔
/// * `on_progress` - 進捗の通知先
pub async fn run_enrichment<W, E, F>(
    worklist: &W,
    enricher: &E,
    limiter: &mut RateLimiter,
    options: &EnrichOptions,
    mut on_progress: F,
) -> Result<EnrichSummary>
where
    W: Worklist + ?Sized,
    E: Enrich + ?Sized,
    F: FnMut(&ProgressReport),
{
    // 0件の取得は「未処理なし」と区別できない
    if options.limit == 0 {
        return Err(PipelineError::Config("取得件数は1以上を指定してください".into()));
    }

    let pacing = limiter.pacing().clone();
    let started = pacing.now();
    let report_every = options.report_every.max(1);
    let mut summary = EnrichSummary::default();

    loop {
        if let Some(max) = options.max_batches {
            if summary.batches.len() >= max {
                info!(max, "取得回数の上限に到達");
                break;
            }
        }

        summary.pulls += 1;
        let ids = worklist
            .fetch_pending(options.limit)
            .await
            .map_err(|e| match e {
                PipelineError::WorklistFetch(_) => e,
                other => PipelineError::WorklistFetch(other.to_string()),
            })?;

        if ids.is_empty() {
            summary.completed = true;
            break;
        }

        let number = summary.batches.len() + 1;
        let total = ids.len();
        info!(batch = number, total, "エンリッチ開始");

        let batch_started = pacing.now();
        let mut batch = BatchSummary {
            number,
            total,
            ..Default::default()
        };

        for (i, id) in ids.iter().enumerate() {
            limiter.acquire().await;

            match enricher.enrich(id).await {
                Ok(name) => {
                    batch.succeeded += 1;
                    debug!(location_id = %id, name = name.as_deref().unwrap_or(id), "エンリッチ成功");
                }
                Err(e) => {
                    batch.failed += 1;
                    let message = truncate_chars(&e.to_string(), ERROR_MESSAGE_CHARS);
                    warn!(location_id = %id, error = %message, "エンリッチ失敗");
                }
            }

            let processed = i + 1;
            if processed % report_every == 0 || processed == total {
                let elapsed = pacing.now().saturating_duration_since(batch_started);
                on_progress(&ProgressReport::new(
                    processed,
                    total,
                    batch.succeeded,
                    batch.failed,
                    elapsed,
                ));
            }
        }

        batch.elapsed = pacing.now().saturating_duration_since(batch_started);
        summary.succeeded += batch.succeeded;
        summary.failed += batch.failed;
        info!(
            batch = number,
            succeeded = batch.succeeded,
            failed = batch.failed,
            "バッチ完了"
        );
        summary.batches.push(batch);
    }

    summary.elapsed = pacing.now().saturating_duration_since(started);
    Ok(summary)
}
