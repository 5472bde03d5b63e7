//! 施設テーブルへの一括upsert
//!
//! バッチ単位で送信し、失敗したバッチは小さいバッチに分割して
//! 1回だけ再送する。それでも失敗した分は件数を数えて先へ進む。
//! 最初の送信が通信エラーの場合は接続先に届かないとみなして中断する。

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use carehome_common::FacilityRow;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

/// IDをキーに既存行を上書きするupsert先
#[async_trait]
pub trait UpsertSink: Send + Sync {
    async fn upsert(&self, rows: &[FacilityRow]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub batch_size: usize,
    pub fallback_batch_size: usize,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub batches: usize,
    pub uploaded: usize,
    pub failed_rows: usize,
    /// 分割再送したバッチ数
    pub retried_batches: usize,
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("  {bar:40} {pos}/{len} バッチ {msg}") {
        pb.set_style(style);
    }
    pb
}

/// 行を一括upsertする
pub async fn upload_rows<S>(
    sink: &S,
    rows: &[FacilityRow],
    options: &UploadOptions,
) -> Result<UploadStats>
where
    S: UpsertSink + ?Sized,
{
    let batch_size = options.batch_size.max(1);
    let fallback = options.fallback_batch_size.max(1);
    let mut stats = UploadStats::default();

    let pb = progress_bar(rows.len().div_ceil(batch_size), options.show_progress);

    for (idx, batch) in rows.chunks(batch_size).enumerate() {
        stats.batches += 1;

        match sink.upsert(batch).await {
            Ok(()) => stats.uploaded += batch.len(),
            Err(e) if stats.batches == 1 && e.is_transport() => {
                pb.finish_and_clear();
                return Err(PipelineError::EndpointUnreachable(e.to_string()));
            }
            Err(e) if fallback < batch.len() => {
                warn!(batch = idx + 1, error = %e, "バッチ失敗、分割して再送");
                stats.retried_batches += 1;

                for mini in batch.chunks(fallback) {
                    match sink.upsert(mini).await {
                        Ok(()) => stats.uploaded += mini.len(),
                        Err(e) => {
                            warn!(batch = idx + 1, size = mini.len(), error = %e, "分割バッチ失敗");
                            stats.failed_rows += mini.len();
                        }
                    }
                }
            }
            Err(e) => {
                warn!(batch = idx + 1, error = %e, "バッチ失敗");
                stats.failed_rows += batch.len();
            }
        }

        pb.set_message(format!("失敗 {}件", stats.failed_rows));
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(?stats, "upsert完了");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 指定サイズ以上のバッチを拒否するsink
    struct FlakySink {
        reject_at_least: usize,
        reject_ids: Vec<String>,
        /// この回数目の呼び出しを通信エラーにする
        transport_failure_at: Option<usize>,
        calls: Mutex<Vec<usize>>,
    }

    impl FlakySink {
        fn new(reject_at_least: usize, reject_ids: &[&str]) -> Self {
            Self {
                reject_at_least,
                reject_ids: reject_ids.iter().map(|s| s.to_string()).collect(),
                transport_failure_at: None,
                calls: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl UpsertSink for FlakySink {
        async fn upsert(&self, rows: &[FacilityRow]) -> Result<()> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(rows.len());
                calls.len()
            };
            if Some(call) == self.transport_failure_at {
                return Err(PipelineError::Transport("connection refused".into()));
            }
            let has_bad_row = rows.iter().any(|r| self.reject_ids.contains(&r.id));
            if rows.len() >= self.reject_at_least || has_bad_row {
                return Err(PipelineError::RemoteRejection {
                    status: 413,
                    body: "too large".into(),
                });
            }
            Ok(())
        }
    }

    fn rows(n: usize) -> Vec<FacilityRow> {
        (0..n)
            .map(|i| FacilityRow {
                id: format!("1-{}", i),
                ..Default::default()
            })
            .collect()
    }

    fn options() -> UploadOptions {
        UploadOptions {
            batch_size: 10,
            fallback_batch_size: 3,
            show_progress: false,
        }
    }

    #[tokio::test]
    async fn test_upload_all_batches_succeed() {
        let sink = FlakySink::new(usize::MAX, &[]);
        let stats = upload_rows(&sink, &rows(25), &options()).await.unwrap();

        assert_eq!(stats.batches, 3);
        assert_eq!(stats.uploaded, 25);
        assert_eq!(stats.failed_rows, 0);
        assert_eq!(*sink.calls.lock().unwrap(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_split_and_retried() {
        let sink = FlakySink::new(10, &[]);
        let stats = upload_rows(&sink, &rows(12), &options()).await.unwrap();

        assert_eq!(stats.retried_batches, 1);
        assert_eq!(stats.uploaded, 12);
        assert_eq!(*sink.calls.lock().unwrap(), vec![10, 3, 3, 3, 1, 2]);
    }

    #[tokio::test]
    async fn test_failed_mini_batch_is_counted() {
        let sink = FlakySink::new(usize::MAX, &["1-4"]);
        let stats = upload_rows(&sink, &rows(10), &options()).await.unwrap();

        // 1-4 を含む分割バッチ（1-3..1-5）だけが失敗
        assert_eq!(stats.failed_rows, 3);
        assert_eq!(stats.uploaded, 7);
    }

    #[tokio::test]
    async fn test_first_transport_failure_aborts() {
        let mut sink = FlakySink::new(usize::MAX, &[]);
        sink.transport_failure_at = Some(1);

        let err = upload_rows(&sink, &rows(25), &options()).await.unwrap_err();

        assert!(matches!(err, PipelineError::EndpointUnreachable(_)));
        // 分割再送もしない
        assert_eq!(*sink.calls.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_later_transport_failure_continues() {
        let mut sink = FlakySink::new(usize::MAX, &[]);
        sink.transport_failure_at = Some(2);

        let stats = upload_rows(&sink, &rows(25), &options()).await.unwrap();

        assert_eq!(stats.batches, 3);
        assert_eq!(stats.retried_batches, 1);
        assert_eq!(stats.uploaded, 25);
        assert_eq!(*sink.calls.lock().unwrap(), vec![10, 10, 3, 3, 3, 1, 5]);
    }
}
