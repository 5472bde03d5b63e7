use crate::error::{PipelineError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use carehome_common::{clean_value, require_columns, SourceRow};
use std::path::Path;

/// CQCエクスポートのシート名
const LOCATIONS_SHEET: &str = "Locations";

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // IDや件数が "123.0" にならないように
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// ワークブックの Locations シート（無ければ先頭シート）を読み込む
pub(super) fn read_rows(path: &Path) -> Result<Vec<SourceRow>> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| PipelineError::Workbook(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    let sheet = sheet_names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(LOCATIONS_SHEET))
        .or_else(|| sheet_names.first())
        .cloned()
        .ok_or_else(|| PipelineError::Workbook("シートがありません".into()))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| PipelineError::Workbook(format!("{}: {}", sheet, e)))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(header_row) => header_row
            .iter()
            .map(|c| clean_value(&cell_to_string(c)))
            .collect(),
        None => return Ok(Vec::new()),
    };
    require_columns(&headers)?;

    let rows = rows_iter
        .map(|cells| {
            headers
                .iter()
                .cloned()
                .zip(cells.iter().map(cell_to_string))
                .collect::<SourceRow>()
        })
        .collect();

    Ok(rows)
}
