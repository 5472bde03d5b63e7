//! 郵便番号の正規化と形式チェック

use carehome_common::{normalize_key, Facility};
use regex::Regex;
use std::collections::BTreeSet;

/// 英国郵便番号の形式か（正規化済みの値に対して判定）
///
/// 形式外でもAPIへの問い合わせは行う（判定はAPI側に任せる）
pub fn is_valid_postcode(key: &str) -> bool {
    lazy_static::lazy_static! {
        static ref UK_POSTCODE: Regex =
            Regex::new(r"^[A-Z]{1,2}[0-9][A-Z0-9]? ?[0-9][A-Z]{2}$").unwrap();
    }
    UK_POSTCODE.is_match(key)
}

/// 施設から集めた郵便番号
#[derive(Debug, Clone, Default)]
pub struct PostcodeSet {
    /// 重複なしの正規化済み郵便番号
    pub keys: BTreeSet<String>,
    /// 郵便番号が空の施設数
    pub blank: usize,
    /// 形式外の郵便番号
    pub invalid: BTreeSet<String>,
}

/// 施設一覧から問い合わせ対象の郵便番号を集める
pub fn collect_postcodes(facilities: &[Facility]) -> PostcodeSet {
    let mut set = PostcodeSet::default();

    for facility in facilities {
        let key = normalize_key(facility.postcode());
        if key.is_empty() {
            set.blank += 1;
            continue;
        }
        if !is_valid_postcode(&key) {
            set.invalid.insert(key.clone());
        }
        set.keys.insert(key);
    }

    set
}
