//! キャッシュ対応バッチリゾルバ
//!
//! 郵便番号の集合を受け取り、キャッシュに無いものだけを
//! 一括ルックアップAPIへ固定サイズのチャンクで問い合わせる。
//!
//! ## 処理フロー
//! 1. 未問い合わせのキーを抽出（キャッシュ済みは問い合わせない）
//! 2. チャンクごとにレート制限を経てAPIを呼ぶ
//! 3. 失敗したチャンクはバックオフ後にスキップ（再試行しない）
//! 4. ポリシーに従って途中保存、終了時は必ず保存

pub mod cache;
pub mod checkpoint;

pub use cache::GeocodeCache;
pub use checkpoint::{CheckpointPolicy, Checkpointer};

use crate::error::{PipelineError, Result};
use crate::ratelimit::RateLimiter;
use async_trait::async_trait;
use carehome_common::{normalize_key, Facility, GeoPoint};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 一括ルックアップの1件分の結果
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(GeoPoint),
    NotFound,
    /// 必要なフィールドが欠けている（該当なし扱い）
    Malformed(String),
}

/// `{query, result}` の組
#[derive(Debug, Clone, PartialEq)]
pub struct LookupPair {
    pub query: String,
    pub outcome: LookupOutcome,
}

/// 一括ルックアップAPI
#[async_trait]
pub trait BulkLookup: Send + Sync {
    /// チャンク1つ分を問い合わせる
    async fn lookup(&self, keys: &[String]) -> Result<Vec<LookupPair>>;

    /// 入力の全キーに対して応答を返すAPIか
    ///
    /// trueの場合、応答に含まれなかったキーは「該当なし」として記録する
    fn answers_every_key(&self) -> bool {
        false
    }
}

/// リゾルバの設定
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub batch_size: usize,
    pub failure_backoff: Duration,
    pub checkpoint: CheckpointPolicy,
    /// キャッシュの保存先
    pub snapshot_path: PathBuf,
    pub show_progress: bool,
}

/// 実行結果の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// 未問い合わせだったキー数
    pub pending: usize,
    /// 外部API呼び出し回数
    pub calls: usize,
    pub found: usize,
    pub not_found: usize,
    /// 不正な応答項目（該当なしとして記録）
    pub malformed: usize,
    /// 失敗してスキップしたチャンク数
    pub skipped_chunks: usize,
    /// 応答に含まれず未記録のままのキー数
    pub unanswered: usize,
    /// 途中保存の回数（終了時の保存は含まない）
    pub checkpoints: usize,
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("  {bar:40} {pos}/{len} チャンク ({eta})") {
        pb.set_style(style);
    }
    pb
}

/// キャッシュに無いキーを解決してキャッシュへ追加する
///
/// # Arguments
/// * `keys` - 正規化済みの郵便番号集合
/// * `cache` - 読み込み済みのキャッシュ（その場で更新）
/// * `lookup` - 一括ルックアップAPI
/// * `limiter` - 呼び出し前に取得するレート制限
/// * `options` - チャンクサイズ・保存ポリシーなど
///
/// # Returns
/// 集計。最初の呼び出しで接続できない場合のみエラー
pub async fn resolve<L>(
    keys: &BTreeSet<String>,
    cache: &mut GeocodeCache,
    lookup: &L,
    limiter: &mut RateLimiter,
    options: &ResolveOptions,
) -> Result<ResolveStats>
where
    L: BulkLookup + ?Sized,
{
    let pending = cache.pending(keys);
    let mut stats = ResolveStats {
        pending: pending.len(),
        ..Default::default()
    };

    if pending.is_empty() {
        info!(keys = keys.len(), "全てキャッシュ済み、問い合わせなし");
        cache.save(&options.snapshot_path)?;
        return Ok(stats);
    }

    let batch_size = options.batch_size.max(1);
    let chunk_count = pending.len().div_ceil(batch_size);
    info!(pending = pending.len(), chunks = chunk_count, "ジオコード開始");

    let pb = progress_bar(chunk_count, options.show_progress);
    let mut checkpointer = Checkpointer::new(options.checkpoint, limiter.pacing().now());

    for (idx, chunk) in pending.chunks(batch_size).enumerate() {
        limiter.acquire().await;
        stats.calls += 1;

        match lookup.lookup(chunk).await {
            Ok(pairs) => merge_chunk(chunk, pairs, lookup.answers_every_key(), cache, &mut stats),
            Err(e) if stats.calls == 1 && e.is_transport() => {
                pb.finish_and_clear();
                return Err(PipelineError::EndpointUnreachable(e.to_string()));
            }
            Err(e) => {
                warn!(chunk = idx, size = chunk.len(), error = %e, "チャンクをスキップ");
                stats.skipped_chunks += 1;
                limiter.pacing().sleep(options.failure_backoff).await;
            }
        }

        if checkpointer.record_chunk(limiter.pacing().now()) {
            cache.save(&options.snapshot_path)?;
            stats.checkpoints += 1;
            debug!(entries = cache.len(), "キャッシュを途中保存");
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    cache.save(&options.snapshot_path)?;
    info!(?stats, "ジオコード完了");

    Ok(stats)
}

/// 成功したチャンクの応答をキャッシュへ反映
fn merge_chunk(
    chunk: &[String],
    pairs: Vec<LookupPair>,
    answers_every_key: bool,
    cache: &mut GeocodeCache,
    stats: &mut ResolveStats,
) {
    let members: HashSet<&str> = chunk.iter().map(String::as_str).collect();
    let mut answered: HashSet<String> = HashSet::new();

    for pair in pairs {
        let key = normalize_key(&pair.query);
        if !members.contains(key.as_str()) {
            debug!(query = %pair.query, "チャンク外の応答を無視");
            continue;
        }
        answered.insert(key.clone());

        match pair.outcome {
            LookupOutcome::Found(point) => {
                if cache.insert(key, Some(point)) {
                    stats.found += 1;
                }
            }
            LookupOutcome::NotFound => {
                if cache.insert(key, None) {
                    stats.not_found += 1;
                }
            }
            LookupOutcome::Malformed(reason) => {
                warn!(postcode = %key, %reason, "不正な応答項目、該当なしとして記録");
                if cache.insert(key, None) {
                    stats.malformed += 1;
                }
            }
        }
    }

    for key in chunk.iter().filter(|k| !answered.contains(k.as_str())) {
        if answers_every_key {
            if cache.insert(key.clone(), None) {
                stats.not_found += 1;
            }
        } else {
            stats.unanswered += 1;
        }
    }
}

/// 座標反映の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub updated: usize,
    pub missing: usize,
}

/// キャッシュの座標を施設へ反映する
///
/// 郵便番号が無い・該当なし・未問い合わせの施設は座標をクリアする
pub fn apply_coordinates(facilities: &mut [Facility], cache: &GeocodeCache) -> ApplyStats {
    let mut stats = ApplyStats::default();

    for facility in facilities.iter_mut() {
        let key = normalize_key(facility.postcode());
        match cache.get(&key).flatten() {
            Some(point) if !key.is_empty() => {
                facility.latitude = Some(point.lat);
                facility.longitude = Some(point.lng);
                stats.updated += 1;
            }
            _ => {
                facility.latitude = None;
                facility.longitude = None;
                stats.missing += 1;
            }
        }
    }

    stats
}
