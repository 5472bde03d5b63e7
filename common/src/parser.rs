//! CQCエクスポートのパーサー
//!
//! CQCの評価エクスポート（Locationsシート）は1施設につき
//! 評価ドメインごとに1行あるため、Location IDで集約して
//! 施設単位のレコードにする。

use crate::error::{Error, Result};
use crate::normalize::{clean_value, normalize_key};
use crate::types::{Address, Facility, Party};
use std::collections::HashMap;

/// ヘッダー名 → セル値
pub type SourceRow = HashMap<String, String>;

const LOCATION_ID: &str = "Location ID";
const OVERALL_DOMAIN: &str = "Overall";

/// 集約結果
#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    /// 初出順の施設一覧
    pub facilities: Vec<Facility>,
    /// 読み込んだ行数
    pub rows_read: usize,
    /// Location IDが空でスキップした行数
    pub rows_skipped: usize,
}

/// 列を取得（完全一致 → 大文字小文字無視 → 別名の順）
///
/// エクスポートの版によって列名が微妙に違う（`Care Home?` / `Care home?` など）
fn field<'a>(row: &'a SourceRow, names: &[&str]) -> &'a str {
    for name in names {
        if let Some(v) = row.get(*name) {
            return v.as_str();
        }
    }
    for name in names {
        if let Some((_, v)) = row.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            return v.as_str();
        }
    }
    ""
}

fn cell(row: &SourceRow, names: &[&str]) -> String {
    clean_value(field(row, names))
}

/// ヘッダー行に必須列があるか確認
pub fn require_columns(headers: &[String]) -> Result<()> {
    let found = headers
        .iter()
        .any(|h| clean_value(h).eq_ignore_ascii_case(LOCATION_ID));
    if found {
        Ok(())
    } else {
        Err(Error::MissingColumn(LOCATION_ID.to_string()))
    }
}

/// 最初の行から施設レコードを作成
fn facility_from_row(id: String, row: &SourceRow) -> Facility {
    Facility {
        id,
        ods_code: cell(row, &["Location ODS Code"]),
        name: cell(row, &["Location Name"]),
        is_care_home: cell(row, &["Care Home?", "Care home?"]).eq_ignore_ascii_case("Y"),
        location_type: cell(row, &["Location Type"]),
        inspection_category: cell(
            row,
            &["Location Primary Inspection Category", "Location Inspection Category"],
        ),
        address: Address {
            street: cell(row, &["Location Street Address"]),
            line2: cell(row, &["Location Address Line 2"]),
            city: cell(row, &["Location City"]),
            postcode: normalize_key(field(row, &["Location Post Code"])),
            local_authority: cell(row, &["Location Local Authority"]),
            region: cell(row, &["Location Region"]),
        },
        ccg: cell(row, &["Location ONSPD CCG", "Location CCG"]),
        service_group: cell(row, &["Service / Population Group"]),
        url: cell(row, &["URL", "Location URL"]),
        provider: Party {
            id: cell(row, &["Provider ID"]),
            name: cell(row, &["Provider Name"]),
        },
        brand: Party {
            id: cell(row, &["Brand ID"]),
            name: cell(row, &["Brand Name"]),
        },
        ..Default::default()
    }
}

/// 行をLocation IDで集約する
///
/// - Location IDが空の行はスキップ
/// - 施設の属性は最初に出現した行で確定
/// - `Domain` と `Latest Rating` がある行は評価として追加
/// - `Overall` ドメインは総合評価と公表日も設定
pub fn consolidate_rows<I>(rows: I) -> Consolidation
where
    I: IntoIterator<Item = SourceRow>,
{
    let mut result = Consolidation::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        result.rows_read += 1;

        let id = cell(&row, &[LOCATION_ID]);
        if id.is_empty() {
            result.rows_skipped += 1;
            continue;
        }

        let pos = match index.get(&id) {
            Some(&pos) => pos,
            None => {
                result.facilities.push(facility_from_row(id.clone(), &row));
                index.insert(id, result.facilities.len() - 1);
                result.facilities.len() - 1
            }
        };
        let facility = &mut result.facilities[pos];

        let domain = cell(&row, &["Domain"]);
        let rating = cell(&row, &["Latest Rating"]);
        if domain.is_empty() || rating.is_empty() {
            continue;
        }

        if domain == OVERALL_DOMAIN {
            facility.overall_rating = Some(rating.clone());
            let date = cell(&row, &["Publication Date"]);
            facility.publication_date = if date.is_empty() { None } else { Some(date) };
        }
        facility.ratings.insert(domain, rating);
    }

    result
}
