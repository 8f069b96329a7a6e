//! CSV files backing the reference catalog and the per-country combination lists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use firstprompt_common::{Combination, Country, Error, Grade, Language, Result, Subject};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::catalog::ReferenceCatalog;

pub const COUNTRY_FILE: &str = "country_table.csv";
pub const SUBJECT_FILE: &str = "subject_table.csv";
pub const GRADE_FILE: &str = "grade_table.csv";
pub const LANGUAGE_FILE: &str = "language_table.csv";
pub const POPULAR_LANGUAGE_FILE: &str = "popular_language.csv";
pub const COMBOS_DIR: &str = "combos";

const COUNTRY_HEADER: &[&str] = &["id", "english_name"];
const SUBJECT_HEADER: &[&str] = &["id", "country_id", "long_name"];
const GRADE_HEADER: &[&str] = &["id", "country_id", "long_name"];
const LANGUAGE_HEADER: &[&str] = &["id", "english_name"];
const COMBINATION_HEADER: &[&str] = &["country_id", "grade_id", "subject_id"];

#[derive(serde::Deserialize)]
struct LanguageRow {
    id: Option<i64>,
    english_name: String,
}

#[derive(serde::Deserialize)]
struct PopularLanguageRow {
    country_id: i64,
    language_1_id: i64,
    language_2_id: Option<i64>,
}

pub fn load_countries(data_dir: &Path) -> Result<Vec<Country>> {
    read_rows(&data_dir.join(COUNTRY_FILE))
}

pub fn load_subjects(data_dir: &Path) -> Result<Vec<Subject>> {
    read_rows(&data_dir.join(SUBJECT_FILE))
}

pub fn load_grades(data_dir: &Path) -> Result<Vec<Grade>> {
    read_rows(&data_dir.join(GRADE_FILE))
}

/// Rows without an id are skipped; the warehouse export contains a few.
pub fn load_languages(data_dir: &Path) -> Result<Vec<Language>> {
    let rows: Vec<LanguageRow> = read_rows(&data_dir.join(LANGUAGE_FILE))?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            row.id.map(|id| Language {
                id,
                name: row.english_name,
            })
        })
        .collect())
}

/// Map of country id to its popular language ids, primary first.
///
/// The file is optional; a missing file yields an empty map.
pub fn load_popular_languages(data_dir: &Path) -> Result<HashMap<i64, Vec<i64>>> {
    let path = data_dir.join(POPULAR_LANGUAGE_FILE);
    if !path.exists() {
        debug!("no popular language file at {}", path.display());
        return Ok(HashMap::new());
    }

    let rows: Vec<PopularLanguageRow> = read_rows(&path)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut ids = vec![row.language_1_id];
            ids.extend(row.language_2_id);
            (row.country_id, ids)
        })
        .collect())
}

pub fn save_countries(data_dir: &Path, countries: &[Country]) -> Result<()> {
    write_rows(&data_dir.join(COUNTRY_FILE), COUNTRY_HEADER, countries)
}

pub fn save_subjects(data_dir: &Path, subjects: &[Subject]) -> Result<()> {
    write_rows(&data_dir.join(SUBJECT_FILE), SUBJECT_HEADER, subjects)
}

pub fn save_grades(data_dir: &Path, grades: &[Grade]) -> Result<()> {
    write_rows(&data_dir.join(GRADE_FILE), GRADE_HEADER, grades)
}

pub fn save_languages(data_dir: &Path, languages: &[Language]) -> Result<()> {
    write_rows(&data_dir.join(LANGUAGE_FILE), LANGUAGE_HEADER, languages)
}

pub fn combination_file_path(data_dir: &Path, country_id: i64) -> PathBuf {
    data_dir
        .join(COMBOS_DIR)
        .join(format!("combos_{country_id}.csv"))
}

/// Write one combination file per country in the catalog. Returns the number
/// of files written.
pub fn write_combination_files(data_dir: &Path, catalog: &ReferenceCatalog) -> Result<usize> {
    let mut written = 0;
    for country in catalog.countries() {
        let combinations = catalog.combinations_for_country(country.id);
        let path = combination_file_path(data_dir, country.id);
        write_rows(&path, COMBINATION_HEADER, &combinations)?;
        debug!(
            "wrote {} combinations for {} to {}",
            combinations.len(),
            country.name,
            path.display()
        );
        written += 1;
    }
    info!("wrote {written} combination files");
    Ok(written)
}

pub fn load_combinations(data_dir: &Path, country_id: i64) -> Result<Vec<Combination>> {
    read_rows(&combination_file_path(data_dir, country_id))
}

pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(Error::NotFound(format!("{} does not exist", path.display())));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()
        .map_err(Error::from)
}

/// Truncate `path` and write the header followed by `rows`. The header is
/// written even when there are no rows.
pub(crate) fn write_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
