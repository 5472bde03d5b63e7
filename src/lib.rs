//! 介護施設CRM データパイプライン
//!
//! - CQC評価エクスポートの施設単位への集約
//! - 郵便番号のキャッシュ付き一括ジオコーディング
//! - リモートストア主導の継続バッチエンリッチ
//! - 施設テーブルへのupsertと座標の一括反映

pub mod cli;
pub mod config;
pub mod coords;
pub mod enricher;
pub mod error;
pub mod export;
pub mod http;
pub mod normalizer;
pub mod postcodes;
pub mod ratelimit;
pub mod resolver;
pub mod source;
pub mod supabase;
pub mod upload;
