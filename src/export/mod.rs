pub mod excel;

use crate::error::Result;
use carehome_common::Facility;
use std::path::{Path, PathBuf};

const DEFAULT_FILE_STEM: &str = "facilities";

/// 出力先がフォルダ（または拡張子なし）ならファイル名を補う
fn output_path_for(output: &Path, extension: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.{}", DEFAULT_FILE_STEM, extension))
    } else {
        output.to_path_buf()
    }
}

/// 施設一覧をExcelに出力し、書き出したパスを返す
pub fn export_facilities(facilities: &[Facility], output: &Path) -> Result<PathBuf> {
    let output_path = output_path_for(output, "xlsx");
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    println!("- Excelを生成中...");
    excel::generate_excel(facilities, &output_path)?;
    println!("✔ Excel出力: {}", output_path.display());

    Ok(output_path)
}
