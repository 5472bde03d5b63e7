use std::fmt;
use std::time::Duration;

/// 進捗（処理件数・速度・残り時間）
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 件/秒
    pub rate: f64,
    pub eta: Duration,
}

impl ProgressReport {
    pub fn new(
        processed: usize,
        total: usize,
        succeeded: usize,
        failed: usize,
        elapsed: Duration,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { processed as f64 / secs } else { 0.0 };
        let remaining = total.saturating_sub(processed) as f64;
        let eta = if rate > 0.0 {
            Duration::try_from_secs_f64(remaining / rate).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };

        Self {
            processed,
            total,
            succeeded,
            failed,
            rate,
            eta,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * self.processed as f64 / self.total as f64
        }
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] ({:.1}%) | 成功: {} | 失敗: {} | 速度: {:.1}件/秒 | 残り: {:.1}分",
            self.processed,
            self.total,
            self.percent(),
            self.succeeded,
            self.failed,
            self.rate,
            self.eta.as_secs_f64() / 60.0
        )
    }
}
