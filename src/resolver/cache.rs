//! ジオコードキャッシュモジュール
//!
//! 正規化済み郵便番号をキーにしてジオコード結果をキャッシュし、
//! 同じ郵便番号の再問い合わせをスキップする。
//!
//! 値が `null` のエントリは「問い合わせ済み・該当なし」を表し、
//! キーが無いこと（未問い合わせ）とは区別する。

use crate::error::{PipelineError, Result};
use carehome_common::{normalize_key, GeoPoint};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CACHE_FILE_NAME: &str = "geocode_cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeCache {
    /// バージョン（互換性チェック用）
    version: u32,
    /// 最終保存日時（RFC3339）
    #[serde(default)]
    updated_at: Option<String>,
    /// 郵便番号 → ジオコード結果（null = 該当なし）
    entries: BTreeMap<String, Option<GeoPoint>>,
}

impl GeocodeCache {
    const CURRENT_VERSION: u32 = 1;

    /// フォルダ内のキャッシュファイルのパス
    pub fn cache_path(folder: &Path) -> PathBuf {
        folder.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み
    ///
    /// - 存在しない場合は空のキャッシュ
    /// - バージョン付きの形式と、旧形式（郵便番号 → 結果|null のマップ）を受け付ける
    /// - 読めない・バージョンが違う場合はエラー（保存で上書きしないように中断する）
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let unreadable = |reason: String| PipelineError::CacheUnreadable {
            path: path.display().to_string(),
            reason,
        };

        let reader = BufReader::new(File::open(path)?);
        let value: Value =
            serde_json::from_reader(reader).map_err(|e| unreadable(e.to_string()))?;

        let Value::Object(map) = value else {
            return Err(unreadable("JSONオブジェクトではありません".into()));
        };

        if map.contains_key("version") {
            let cache: GeocodeCache = serde_json::from_value(Value::Object(map))
                .map_err(|e| unreadable(e.to_string()))?;
            if cache.version != Self::CURRENT_VERSION {
                return Err(unreadable(format!(
                    "未対応のバージョン {}（対応: {}）",
                    cache.version,
                    Self::CURRENT_VERSION
                )));
            }
            return Ok(cache);
        }

        let entries: BTreeMap<String, Option<GeoPoint>> = map
            .into_iter()
            .map(|(key, value)| {
                let point = legacy_point(&key, &value);
                (normalize_key(&key), point)
            })
            .collect();
        info!(entries = entries.len(), "旧形式のキャッシュを読み込み");

        Ok(Self {
            entries,
            ..Self::default()
        })
    }

    /// キャッシュファイルを保存（一時ファイルに書いてから置き換え）
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Some(chrono::Utc::now().to_rfc3339());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// キャッシュファイルを削除。削除した場合はtrue
    pub fn clear(path: &Path) -> Result<bool> {
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// キャッシュをルックアップ
    ///
    /// - `None`: 未問い合わせ
    /// - `Some(None)`: 問い合わせ済み・該当なし
    /// - `Some(Some(_))`: ジオコード結果あり
    pub fn get(&self, key: &str) -> Option<Option<&GeoPoint>> {
        self.entries.get(key).map(|v| v.as_ref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// キャッシュに追加。既存のエントリは上書きしない
    ///
    /// 追加した場合はtrue
    pub fn insert(&mut self, key: String, value: Option<GeoPoint>) -> bool {
        match self.entries.entry(key) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    /// 未問い合わせのキー（キー順）
    pub fn pending(&self, keys: &BTreeSet<String>) -> Vec<String> {
        keys.iter()
            .filter(|k| !self.entries.contains_key(k.as_str()))
            .cloned()
            .collect()
    }

    /// キャッシュ件数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// ジオコード結果ありの件数
    pub fn found_count(&self) -> usize {
        self.entries.values().filter(|v| v.is_some()).count()
    }

    /// 該当なしの件数
    pub fn not_found_count(&self) -> usize {
        self.entries.values().filter(|v| v.is_none()).count()
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}

/// 旧形式の値（`{lat, lng, region, admin_district}` または null）
///
/// 座標が欠けている値は該当なしとして扱う
fn legacy_point(key: &str, value: &Value) -> Option<GeoPoint> {
    if value.is_null() {
        return None;
    }
    let lat = value.get("lat").and_then(Value::as_f64);
    let lng = value.get("lng").and_then(Value::as_f64);
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint {
            lat,
            lng,
            region: value.get("region").and_then(Value::as_str).map(str::to_string),
            admin_district: value
                .get("admin_district")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        _ => {
            warn!(postcode = %key, "旧キャッシュの座標が欠けています、該当なしとして扱います");
            None
        }
    }
}

impl Default for GeocodeCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            updated_at: None,
            entries: BTreeMap::new(),
        }
    }
}
