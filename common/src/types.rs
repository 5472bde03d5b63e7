//! 施設データの型定義
//!
//! CLIの各コマンドで共有される型:
//! - Facility: CQCエクスポートを施設単位に集約したレコード（facilities.json）
//! - GeoPoint: 郵便番号のジオコード結果
//! - FacilityRow: リモートDBへupsertするフラットな行
//! - CoordinateUpdate: 座標一括更新RPCの1件

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 住所
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: String,
    pub line2: String,
    pub city: String,
    /// 正規化済み郵便番号
    pub postcode: String,
    pub local_authority: String,
    pub region: String,
}

/// 事業者・ブランド
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Party {
    pub id: String,
    pub name: String,
}

/// 施設（Location ID単位）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    pub id: String,

    #[serde(default)]
    pub ods_code: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub is_care_home: bool,

    #[serde(default)]
    pub location_type: String,

    #[serde(default)]
    pub inspection_category: String,

    #[serde(default)]
    pub address: Address,

    #[serde(default)]
    pub ccg: String,

    #[serde(default)]
    pub service_group: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub provider: Party,

    #[serde(default)]
    pub brand: Party,

    /// ドメイン → 評価（Safe, Effective, ..., Overall）
    #[serde(default)]
    pub ratings: BTreeMap<String, String>,

    #[serde(default)]
    pub overall_rating: Option<String>,

    #[serde(default)]
    pub publication_date: Option<String>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Facility {
    pub fn postcode(&self) -> &str {
        &self.address.postcode
    }

    /// 緯度・経度が両方ある場合のみ
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// ジオコード結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_district: Option<String>,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            region: None,
            admin_district: None,
        }
    }
}

/// フィルタ候補（filters.json）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub local_authorities: Vec<String>,
    pub location_types: Vec<String>,
    pub inspection_categories: Vec<String>,
    pub ratings: Vec<String>,
    pub service_groups: Vec<String>,
}

/// upsert用のフラットな行（テーブル facilities のカラム）
///
/// 座標は座標一括更新RPCで反映するため含めない（upsertで上書きしない）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacilityRow {
    pub id: String,
    pub ods_code: Option<String>,
    pub name: String,
    pub is_care_home: bool,
    pub location_type: Option<String>,
    pub inspection_category: Option<String>,

    pub street: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub local_authority: Option<String>,
    pub region: Option<String>,

    pub provider_id: Option<String>,
    pub provider_name: Option<String>,
    pub brand_id: Option<String>,
    pub brand_name: Option<String>,

    pub rating_safe: Option<String>,
    pub rating_effective: Option<String>,
    pub rating_caring: Option<String>,
    pub rating_responsive: Option<String>,
    pub rating_well_led: Option<String>,
    pub rating_overall: Option<String>,

    pub ccg: Option<String>,
    pub url: Option<String>,
    pub publication_date: Option<String>,
}

/// 空文字列はNULLとして送る
fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl From<&Facility> for FacilityRow {
    fn from(f: &Facility) -> Self {
        let rating = |domain: &str| f.ratings.get(domain).cloned();

        Self {
            id: f.id.clone(),
            ods_code: non_empty(&f.ods_code),
            name: f.name.clone(),
            is_care_home: f.is_care_home,
            location_type: non_empty(&f.location_type),
            inspection_category: non_empty(&f.inspection_category),
            street: non_empty(&f.address.street),
            address_line2: non_empty(&f.address.line2),
            city: non_empty(&f.address.city),
            postcode: non_empty(&f.address.postcode),
            local_authority: non_empty(&f.address.local_authority),
            region: non_empty(&f.address.region),
            provider_id: non_empty(&f.provider.id),
            provider_name: non_empty(&f.provider.name),
            brand_id: non_empty(&f.brand.id),
            brand_name: non_empty(&f.brand.name),
            rating_safe: rating("Safe"),
            rating_effective: rating("Effective"),
            rating_caring: rating("Caring"),
            rating_responsive: rating("Responsive"),
            rating_well_led: rating("Well-led"),
            rating_overall: f.overall_rating.clone().or_else(|| rating("Overall")),
            ccg: non_empty(&f.ccg),
            url: non_empty(&f.url),
            publication_date: f.publication_date.clone(),
        }
    }
}

/// 座標一括更新RPCの1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateUpdate {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
}
