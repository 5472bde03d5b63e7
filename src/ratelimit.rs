//! レート制限モジュール
//!
//! トークンバケットで外部APIの呼び出し間隔を制御する。
//! 時計とスリープは差し替え可能で、テストでは実際に待たずに
//! 経過時間だけを進める `ManualClock` を使う。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// 現在時刻の取得
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// 待機
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// 本番用（tokioのタイマー）
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[async_trait]
impl Sleeper for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
struct ManualState {
    start: Instant,
    offset: Duration,
    sleeps: Vec<Duration>,
}

/// テスト用の手動時計
///
/// `sleep` は待たずに時計を進め、待機時間を記録する。
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                start: Instant::now(),
                offset: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.offset += duration;
        }
    }

    /// 記録された待機の一覧
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .lock()
            .map(|s| s.sleeps.clone())
            .unwrap_or_default()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state
            .lock()
            .map(|s| s.start + s.offset)
            .unwrap_or_else(|_| Instant::now())
    }
}

#[async_trait]
impl Sleeper for ManualClock {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.offset += duration;
            state.sleeps.push(duration);
        }
    }
}

/// 1回の待機の上限
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// 秒数を待機時間に変換（表せない値や上限超えは `MAX_WAIT`）
fn wait_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).map_or(MAX_WAIT, |d| d.min(MAX_WAIT))
}

/// 時計とスリープの組
#[derive(Clone)]
pub struct Pacing {
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl Pacing {
    pub fn tokio() -> Self {
        Self {
            clock: Arc::new(TokioClock),
            sleeper: Arc::new(TokioClock),
        }
    }

    pub fn manual(clock: &ManualClock) -> Self {
        Self {
            clock: Arc::new(clock.clone()),
            sleeper: Arc::new(clock.clone()),
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration).await;
        }
    }
}

impl std::fmt::Debug for Pacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacing").finish_non_exhaustive()
    }
}

/// レート設定
///
/// `requests_per_second` が0以下なら制限なし。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_second: f64,
    /// 連続で許可する最大件数
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_burst() -> u32 {
    1
}

impl RateLimit {
    pub fn per_second(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            burst: 1,
        }
    }

    /// 一定間隔（固定ディレイ相当）
    pub fn every(interval: Duration) -> Self {
        let secs = interval.as_secs_f64();
        Self::per_second(if secs > 0.0 { 1.0 / secs } else { 0.0 })
    }

    pub fn unlimited() -> Self {
        Self::per_second(0.0)
    }

    pub fn is_unlimited(&self) -> bool {
        !(self.requests_per_second > 0.0) || !self.requests_per_second.is_finite()
    }

    /// 1件あたりの最小間隔
    pub fn interval(&self) -> Duration {
        if self.is_unlimited() {
            Duration::ZERO
        } else {
            wait_duration(1.0 / self.requests_per_second)
        }
    }
}

/// トークンバケット
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    tokens: f64,
    last_refill: Option<Instant>,
    pacing: Pacing,
}

impl RateLimiter {
    pub fn new(limit: RateLimit, pacing: Pacing) -> Self {
        Self {
            limit,
            tokens: f64::from(limit.burst.max(1)),
            last_refill: None,
            pacing,
        }
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    fn refill(&mut self, now: Instant) {
        let capacity = f64::from(self.limit.burst.max(1));
        if let Some(last) = self.last_refill {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.limit.requests_per_second).min(capacity);
        }
        self.last_refill = Some(now);
    }

    /// トークンを1つ取得（足りなければ補充されるまで待つ）
    pub async fn acquire(&mut self) {
        if self.limit.is_unlimited() {
            return;
        }

        self.refill(self.pacing.now());

        if self.tokens < 1.0 {
            let wait = (1.0 - self.tokens) / self.limit.requests_per_second;
            self.pacing.sleep(wait_duration(wait)).await;
            self.refill(self.pacing.now());
            // 浮動小数の誤差で1未満に留まっても待ちは済んでいる
            self.tokens = self.tokens.max(1.0);
        }

        self.tokens -= 1.0;
    }
}
