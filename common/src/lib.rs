//! Care-home CRM Common Library
//!
//! CLIの各コマンドで共有される型とユーティリティ

pub mod types;
pub mod error;
pub mod normalize;
pub mod parser;
pub mod filters;

pub use types::{Address, CoordinateUpdate, Facility, FacilityRow, FilterOptions, GeoPoint, Party};
pub use error::{Error, Result};
pub use normalize::{clean_value, normalize_key};
pub use parser::{consolidate_rows, require_columns, Consolidation, SourceRow};
pub use filters::extract_filters;
