//! キャッシュ機能テスト
//!
//! ジオコードキャッシュの保存・読み込み・互換性を検証

use carehome_common::GeoPoint;
use carehome_pipeline::error::PipelineError;
use carehome_pipeline::resolver::cache::CACHE_FILE_NAME;
use carehome_pipeline::resolver::GeocodeCache;
use std::collections::BTreeSet;
use tempfile::tempdir;

/// 存在しないキャッシュファイル
#[test]
fn test_cache_file_missing() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cache = GeocodeCache::load(&GeocodeCache::cache_path(dir.path())).unwrap();

    assert_eq!(cache.len(), 0);
    assert!(cache.is_empty());
    assert!(cache.updated_at().is_none());
}

/// キャッシュの保存と読み込み（該当なしはnullとして残る）
#[test]
fn test_cache_save_and_load() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = GeocodeCache::cache_path(dir.path());

    let mut cache = GeocodeCache::load(&path).unwrap();
    cache.insert("AB1 2CD".to_string(), Some(GeoPoint::new(57.1, -2.1)));
    cache.insert("ZZ9 9ZZ".to_string(), None);
    cache.save(&path).expect("キャッシュ保存失敗");

    let loaded = GeocodeCache::load(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.found_count(), 1);
    assert_eq!(loaded.not_found_count(), 1);
    assert!(loaded.updated_at().is_some());

    let point = loaded
        .get("AB1 2CD")
        .flatten()
        .expect("キャッシュが見つからない");
    assert_eq!(point.lat, 57.1);
    assert_eq!(point.lng, -2.1);
    assert_eq!(loaded.get("ZZ9 9ZZ"), Some(None));
    assert_eq!(loaded.get("EF3 4GH"), None);

    let raw = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["version"], 1);
    assert!(json["entries"]["ZZ9 9ZZ"].is_null());
}

/// 保存後に一時ファイルが残らない
#[test]
fn test_cache_save_leaves_no_temp_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join(CACHE_FILE_NAME);

    let mut cache = GeocodeCache::default();
    cache.insert("AB1 2CD".to_string(), None);
    cache.save(&path).expect("キャッシュ保存失敗");

    let names: Vec<String> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec![CACHE_FILE_NAME.to_string()]);
}

/// 既存エントリは上書きしない
#[test]
fn test_cache_insert_never_overwrites() {
    let mut cache = GeocodeCache::default();

    assert!(cache.insert("AB1 2CD".to_string(), None));
    assert!(!cache.insert("AB1 2CD".to_string(), Some(GeoPoint::new(1.0, 1.0))));
    assert_eq!(cache.get("AB1 2CD"), Some(None));
}

/// 未問い合わせのキーのみ抽出
#[test]
fn test_cache_pending() {
    let mut cache = GeocodeCache::default();
    cache.insert("A".to_string(), None);
    cache.insert("B".to_string(), Some(GeoPoint::new(1.0, 2.0)));

    let keys: BTreeSet<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
    assert_eq!(cache.pending(&keys), vec!["C".to_string(), "D".to_string()]);
}

/// 破損したキャッシュファイルはエラーにして上書きしない
#[test]
fn test_cache_corrupted_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = GeocodeCache::cache_path(dir.path());
    std::fs::write(&path, "{ invalid json").unwrap();

    let err = GeocodeCache::load(&path).unwrap_err();
    assert!(matches!(err, PipelineError::CacheUnreadable { .. }));
    assert!(err.to_string().contains(CACHE_FILE_NAME));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ invalid json");
}

/// バージョン違いのキャッシュはエラー
#[test]
fn test_cache_version_mismatch() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = GeocodeCache::cache_path(dir.path());
    std::fs::write(&path, r#"{"version": 99, "entries": {"AB1 2CD": null}}"#).unwrap();

    let err = GeocodeCache::load(&path).unwrap_err();
    assert!(matches!(err, PipelineError::CacheUnreadable { .. }));
    assert!(err.to_string().contains("99"));
}

/// 旧形式（郵便番号 → 結果|null のマップ）を読み込める
#[test]
fn test_cache_legacy_plain_map() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = GeocodeCache::cache_path(dir.path());
    std::fs::write(
        &path,
        r#"{
  "AB1 2CD": {"lat": 57.1, "lng": -2.1, "region": "Scotland", "admin_district": "Aberdeen City"},
  "ZZ9 9ZZ": null,
  "EF3 4GH": {"lat": null, "lng": null, "region": null, "admin_district": null}
}"#,
    )
    .unwrap();

    let cache = GeocodeCache::load(&path).unwrap();
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.found_count(), 1);

    let point = cache.get("AB1 2CD").flatten().unwrap();
    assert_eq!(point.region.as_deref(), Some("Scotland"));
    assert_eq!(cache.get("ZZ9 9ZZ"), Some(None));
    assert_eq!(cache.get("EF3 4GH"), Some(None));
}

/// キャッシュの削除
#[test]
fn test_cache_clear() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = GeocodeCache::cache_path(dir.path());

    assert!(!GeocodeCache::clear(&path).unwrap());

    let mut cache = GeocodeCache::default();
    cache.save(&path).unwrap();
    assert!(GeocodeCache::clear(&path).unwrap());
    assert!(!path.exists());
}
