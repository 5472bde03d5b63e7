//! 施設データの正規化モジュール
//!
//! 古いfacilities.jsonや手修正されたデータの郵便番号を
//! 問い合わせキーと同じ形式に揃える。

pub mod postcode;

pub use postcode::{collect_postcodes, is_valid_postcode, PostcodeSet};

use carehome_common::{normalize_key, Facility};

/// 個別の修正内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationCorrection {
    /// 施設ID
    pub facility_id: String,
    /// 修正前の値
    pub original: String,
    /// 修正後の値
    pub corrected: String,
}

/// 正規化の統計情報
#[derive(Debug, Clone, Default)]
pub struct NormalizationResult {
    /// 処理したレコード数
    pub total_records: usize,
    pub corrections: Vec<NormalizationCorrection>,
}

/// 施設の郵便番号を正規化する
pub fn normalize_facilities(facilities: &mut [Facility]) -> NormalizationResult {
    let mut result = NormalizationResult {
        total_records: facilities.len(),
        ..Default::default()
    };

    for facility in facilities.iter_mut() {
        let normalized = normalize_key(&facility.address.postcode);
        if normalized != facility.address.postcode {
            result.corrections.push(NormalizationCorrection {
                facility_id: facility.id.clone(),
                original: std::mem::replace(&mut facility.address.postcode, normalized.clone()),
                corrected: normalized,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use carehome_common::Address;

    #[test]
    fn test_normalize_facilities_records_corrections() {
        let mut facilities = vec![
            Facility {
                id: "1".into(),
                address: Address {
                    postcode: " m1  1ae".into(),
                    ..Default::default()
                },
                ..Default::default()
            },
            Facility {
                id: "2".into(),
                address: Address {
                    postcode: "M1 1AE".into(),
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        let result = normalize_facilities(&mut facilities);
        assert_eq!(result.total_records, 2);
        assert_eq!(result.corrections.len(), 1);
        assert_eq!(result.corrections[0].original, " m1  1ae");
        assert_eq!(facilities[0].address.postcode, "M1 1AE");
    }
}
