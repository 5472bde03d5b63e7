//! Excel生成
//!
//! 施設一覧を1シートの表として出力する。

use crate::error::{PipelineError, Result};
use carehome_common::Facility;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::Path;

const SHEET_NAME: &str = "Facilities";

const HEADERS: &[(&str, f64)] = &[
    ("Location ID", 14.0),
    ("Name", 36.0),
    ("Care Home", 10.0),
    ("Location Type", 24.0),
    ("Postcode", 11.0),
    ("Region", 18.0),
    ("Local Authority", 22.0),
    ("Provider", 30.0),
    ("Overall Rating", 20.0),
    ("Publication Date", 16.0),
    ("Latitude", 11.0),
    ("Longitude", 11.0),
];

fn write_row(sheet: &mut Worksheet, row: u32, f: &Facility) -> std::result::Result<(), XlsxError> {
    let texts = [
        f.id.as_str(),
        f.name.as_str(),
        if f.is_care_home { "Y" } else { "N" },
        f.location_type.as_str(),
        f.address.postcode.as_str(),
        f.address.region.as_str(),
        f.address.local_authority.as_str(),
        f.provider.name.as_str(),
        f.overall_rating.as_deref().unwrap_or(""),
        f.publication_date.as_deref().unwrap_or(""),
    ];
    for (col, text) in texts.iter().enumerate() {
        if !text.is_empty() {
            sheet.write_string(row, col as u16, *text)?;
        }
    }

    let coord_col = texts.len() as u16;
    if let Some((lat, lng)) = f.coordinates() {
        sheet.write_number(row, coord_col, lat)?;
        sheet.write_number(row, coord_col + 1, lng)?;
    }
    Ok(())
}

fn build_workbook(facilities: &[Facility]) -> std::result::Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, (title, width)) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header_format)?;
        sheet.set_column_width(col as u16, *width)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (i, facility) in facilities.iter().enumerate() {
        write_row(sheet, i as u32 + 1, facility)?;
    }

    if !facilities.is_empty() {
        sheet.autofilter(0, 0, facilities.len() as u32, HEADERS.len() as u16 - 1)?;
    }

    Ok(workbook)
}

pub fn generate_excel(facilities: &[Facility], output_path: &Path) -> Result<()> {
    let mut workbook = build_workbook(facilities)
        .map_err(|e| PipelineError::ExcelGeneration(e.to_string()))?;
    workbook
        .save(output_path)
        .map_err(|e| PipelineError::ExcelGeneration(e.to_string()))?;
    Ok(())
}
