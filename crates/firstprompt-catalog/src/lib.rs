pub mod catalog;
pub mod files;
pub mod warehouse;

pub use catalog::{CombinationNames, ReferenceCatalog, cross_join_combinations};
pub use files::{combination_file_path, load_combinations, write_combination_files};
pub use warehouse::{BigQuerySource, DownloadReport, ReferenceSource, download_reference_data};
