//! キャッシュ保存タイミング

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// 途中保存のポリシー（終了時は常に保存する）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// Nチャンクごと
    EveryChunks(usize),
    /// N秒ごと
    EverySeconds(u64),
    /// 終了時のみ
    FinalOnly,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        CheckpointPolicy::EveryChunks(10)
    }
}

/// ポリシーに従って保存すべきかを判定する
#[derive(Debug)]
pub struct Checkpointer {
    policy: CheckpointPolicy,
    chunks_since: usize,
    last: Instant,
}

impl Checkpointer {
    pub fn new(policy: CheckpointPolicy, now: Instant) -> Self {
        Self {
            policy,
            chunks_since: 0,
            last: now,
        }
    }

    /// チャンク1つの処理完了を記録し、保存が必要ならtrue
    pub fn record_chunk(&mut self, now: Instant) -> bool {
        self.chunks_since += 1;

        let due = match self.policy {
            CheckpointPolicy::EveryChunks(0) | CheckpointPolicy::FinalOnly => false,
            CheckpointPolicy::EveryChunks(n) => self.chunks_since >= n,
            CheckpointPolicy::EverySeconds(secs) => {
                now.saturating_duration_since(self.last) >= Duration::from_secs(secs)
            }
        };

        if due {
            self.chunks_since = 0;
            self.last = now;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_chunks() {
        let now = Instant::now();
        let mut cp = Checkpointer::new(CheckpointPolicy::EveryChunks(3), now);
        let fired: Vec<bool> = (0..7).map(|_| cp.record_chunk(now)).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn test_every_seconds() {
        let start = Instant::now();
        let mut cp = Checkpointer::new(CheckpointPolicy::EverySeconds(10), start);
        assert!(!cp.record_chunk(start + Duration::from_secs(4)));
        assert!(cp.record_chunk(start + Duration::from_secs(10)));
        // 直前の保存から数え直す
        assert!(!cp.record_chunk(start + Duration::from_secs(15)));
        assert!(cp.record_chunk(start + Duration::from_secs(21)));
    }

    #[test]
    fn test_final_only_never_fires() {
        let now = Instant::now();
        let mut cp = Checkpointer::new(CheckpointPolicy::FinalOnly, now);
        let mut zero = Checkpointer::new(CheckpointPolicy::EveryChunks(0), now);
        for _ in 0..100 {
            assert!(!cp.record_chunk(now));
            assert!(!zero.record_chunk(now));
        }
    }

    #[test]
    fn test_policy_serde() {
        let json = serde_json::to_string(&CheckpointPolicy::EveryChunks(5)).unwrap();
        assert_eq!(json, r#"{"every_chunks":5}"#);
        let policy: CheckpointPolicy = serde_json::from_str(r#""final_only""#).unwrap();
        assert_eq!(policy, CheckpointPolicy::FinalOnly);
    }
}
