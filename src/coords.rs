//! 座標の一括更新
//!
//! ジオコード済みの施設について `{id, lat, lng}` を
//! バッチごとに一括更新RPCへ送る。

use crate::error::{PipelineError, Result};
use crate::ratelimit::RateLimiter;
use async_trait::async_trait;
use carehome_common::{CoordinateUpdate, Facility};
use tracing::{info, warn};

#[async_trait]
pub trait CoordinateSink: Send + Sync {
    async fn update_coordinates(&self, updates: &[CoordinateUpdate]) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushStats {
    pub batches: usize,
    pub sent: usize,
    pub failed_batches: usize,
    pub failed_rows: usize,
}

/// 座標のある施設から更新リストを作る
pub fn collect_updates(facilities: &[Facility]) -> Vec<CoordinateUpdate> {
    facilities
        .iter()
        .filter_map(|f| {
            f.coordinates().map(|(lat, lng)| CoordinateUpdate {
                id: f.id.clone(),
                lat,
                lng,
            })
        })
        .collect()
}

/// 更新リストをバッチ送信する（失敗したバッチは数えて先へ進む）
///
/// 最初のバッチが通信エラーの場合は `EndpointUnreachable` で中断
pub async fn push_coordinates<S>(
    sink: &S,
    updates: &[CoordinateUpdate],
    batch_size: usize,
    limiter: &mut RateLimiter,
) -> Result<PushStats>
where
    S: CoordinateSink + ?Sized,
{
    let mut stats = PushStats::default();

    for (idx, batch) in updates.chunks(batch_size.max(1)).enumerate() {
        limiter.acquire().await;
        stats.batches += 1;

        match sink.update_coordinates(batch).await {
            Ok(()) => stats.sent += batch.len(),
            Err(e) if stats.batches == 1 && e.is_transport() => {
                return Err(PipelineError::EndpointUnreachable(e.to_string()));
            }
            Err(e) => {
                warn!(batch = idx + 1, size = batch.len(), error = %e, "座標更新失敗");
                stats.failed_batches += 1;
                stats.failed_rows += batch.len();
            }
        }
    }

    info!(?stats, "座標更新完了");
    Ok(stats)
}
