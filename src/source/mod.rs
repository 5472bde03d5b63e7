//! 入力ファイルの読み込み
//!
//! CQCエクスポート（CSV / ワークブック）と施設JSONの読み書き。

mod csv_rows;
mod workbook;

use crate::error::{PipelineError, Result};
use carehome_common::{Facility, SourceRow};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// 対応するワークブック拡張子
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn is_workbook(path: &Path) -> bool {
    WORKBOOK_EXTENSIONS.contains(&extension(path).as_str())
}

/// CQCエクスポートを行単位で読み込む
///
/// 拡張子がワークブックならcalamine、それ以外はCSVとして読む
pub fn read_rows(path: &Path) -> Result<Vec<SourceRow>> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.display().to_string()));
    }

    if is_workbook(path) {
        workbook::read_rows(path)
    } else {
        csv_rows::read_rows(path)
    }
}

/// 施設JSONを読み込む
pub fn read_facilities(path: &Path) -> Result<Vec<Facility>> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.display().to_string()));
    }

    let reader = BufReader::new(File::open(path)?);
    let facilities: Vec<Facility> = serde_json::from_reader(reader)?;
    if facilities.is_empty() {
        return Err(PipelineError::NoFacilities(path.display().to_string()));
    }
    Ok(facilities)
}

/// JSONを整形して書き出す
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}
