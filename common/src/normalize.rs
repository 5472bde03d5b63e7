//! キーの正規化
//!
//! 入力の表記揺れに関係なく同じキーで引けるように、
//! 大文字化・前後空白除去・連続空白の1文字化を行う。

/// 郵便番号などのキーを正規化
///
/// # Examples
/// ```
/// use carehome_common::normalize_key;
///
/// assert_eq!(normalize_key("  ab1   2cd "), "AB1 2CD");
/// assert_eq!(normalize_key(""), "");
/// ```
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// セル値のトリム（BOMも除去）
pub fn clean_value(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_collapses_whitespace() {
        assert_eq!(normalize_key("sw1a  1aa"), "SW1A 1AA");
        assert_eq!(normalize_key("\tEC1A\n1BB "), "EC1A 1BB");
    }

    #[test]
    fn test_normalize_key_is_idempotent() {
        let once = normalize_key(" m1 1ae ");
        assert_eq!(normalize_key(&once), once);
    }

    #[test]
    fn test_normalize_key_blank() {
        assert_eq!(normalize_key("   "), "");
    }

    #[test]
    fn test_clean_value_strips_bom() {
        assert_eq!(clean_value("\u{feff}Location ID"), "Location ID");
        assert_eq!(clean_value("  Good "), "Good");
    }
}
