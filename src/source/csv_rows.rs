use crate::error::Result;
use carehome_common::{clean_value, require_columns, SourceRow};
use std::path::Path;

/// CSVをヘッダー付きで読み込む（UTF-8、BOM可）
pub(super) fn read_rows(path: &Path) -> Result<Vec<SourceRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(clean_value).collect();
    require_columns(&headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: SourceRow = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}
