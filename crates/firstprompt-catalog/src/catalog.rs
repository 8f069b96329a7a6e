use std::collections::HashMap;
use std::path::Path;

use firstprompt_common::{
    Combination, Country, Error, Grade, Language, Result, Subject, UNKNOWN_NAME,
};
use tracing::{info, warn};

use crate::files;

/// Human-readable names for one combination, as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationNames {
    pub country: String,
    pub grade: String,
    pub subject: String,
}

/// Read-only lookup tables loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    countries: Vec<Country>,
    subjects: Vec<Subject>,
    grades: Vec<Grade>,
    languages: Vec<Language>,
    popular_languages: HashMap<i64, Vec<i64>>,
    country_names: HashMap<i64, String>,
    subject_names: HashMap<i64, String>,
    grade_names: HashMap<i64, String>,
    language_names: HashMap<i64, String>,
}

impl ReferenceCatalog {
    pub fn new(
        countries: Vec<Country>,
        subjects: Vec<Subject>,
        grades: Vec<Grade>,
        languages: Vec<Language>,
        popular_languages: HashMap<i64, Vec<i64>>,
    ) -> Self {
        // First occurrence wins, matching a linear scan over the table.
        fn index<'a>(rows: impl Iterator<Item = (i64, &'a str)>) -> HashMap<i64, String> {
            let mut map = HashMap::new();
            for (id, name) in rows {
                map.entry(id).or_insert_with(|| name.to_string());
            }
            map
        }

        let country_names = index(countries.iter().map(|c| (c.id, c.name.as_str())));
        let subject_names = index(subjects.iter().map(|s| (s.id, s.name.as_str())));
        let grade_names = index(grades.iter().map(|g| (g.id, g.name.as_str())));
        let language_names = index(languages.iter().map(|l| (l.id, l.name.as_str())));

        Self {
            countries,
            subjects,
            grades,
            languages,
            popular_languages,
            country_names,
            subject_names,
            grade_names,
            language_names,
        }
    }

    pub fn load(data_dir: &Path) -> Result<Self> {
        let catalog = Self::new(
            files::load_countries(data_dir)?,
            files::load_subjects(data_dir)?,
            files::load_grades(data_dir)?,
            files::load_languages(data_dir)?,
            files::load_popular_languages(data_dir)?,
        );
        info!(
            "loaded reference catalog: {} countries, {} subjects, {} grades, {} languages",
            catalog.countries.len(),
            catalog.subjects.len(),
            catalog.grades.len(),
            catalog.languages.len()
        );
        Ok(catalog)
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn grades(&self) -> &[Grade] {
        &self.grades
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    /// Case-insensitive exact match on the English country name.
    pub fn country_id_by_name(&self, name: &str) -> Result<i64> {
        self.countries
            .iter()
            .find(|c| c.name.to_lowercase() == name.to_lowercase())
            .map(|c| c.id)
            .ok_or_else(|| Error::Lookup(format!("country '{name}' not found")))
    }

    /// Case-insensitive exact match on the English language name.
    pub fn language_id_by_name(&self, name: &str) -> Result<i64> {
        self.languages
            .iter()
            .find(|l| l.name.to_lowercase() == name.to_lowercase())
            .map(|l| l.id)
            .ok_or_else(|| Error::Lookup(format!("language '{name}' not found")))
    }

    /// Languages prompts should be generated in for a country, primary first.
    pub fn languages_for_country(&self, country_id: i64) -> Vec<Language> {
        let Some(ids) = self.popular_languages.get(&country_id) else {
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| match self.language_names.get(id) {
                Some(name) => Some(Language {
                    id: *id,
                    name: name.clone(),
                }),
                None => {
                    warn!("country {country_id} lists unknown language id {id}");
                    None
                }
            })
            .collect()
    }

    /// Resolve the names for a combination. Unresolvable ids become
    /// [`UNKNOWN_NAME`] so a stale id never stops a batch.
    pub fn resolve_names(&self, country_id: i64, grade_id: i64, subject_id: i64) -> CombinationNames {
        let lookup = |map: &HashMap<i64, String>, kind: &str, id: i64| match map.get(&id) {
            Some(name) => name.clone(),
            None => {
                warn!("unresolved {kind} id {id}, using placeholder name");
                UNKNOWN_NAME.to_string()
            }
        };

        CombinationNames {
            country: lookup(&self.country_names, "country", country_id),
            grade: lookup(&self.grade_names, "grade", grade_id),
            subject: lookup(&self.subject_names, "subject", subject_id),
        }
    }

    pub fn combinations(&self) -> Vec<Combination> {
        cross_join_combinations(&self.countries, &self.subjects, &self.grades)
    }

    pub fn combinations_for_country(&self, country_id: i64) -> Vec<Combination> {
        let countries: Vec<Country> = self
            .countries
            .iter()
            .filter(|c| c.id == country_id)
            .take(1)
            .cloned()
            .collect();
        cross_join_combinations(&countries, &self.subjects, &self.grades)
    }
}

/// For each country, every (grade, subject) pair scoped to that country.
/// Ordered by country, then grade, then subject.
pub fn cross_join_combinations(
    countries: &[Country],
    subjects: &[Subject],
    grades: &[Grade],
) -> Vec<Combination> {
    let mut combinations = Vec::new();
    for country in countries {
        let country_subjects: Vec<&Subject> =
            subjects.iter().filter(|s| s.country_id == country.id).collect();

        for grade in grades.iter().filter(|g| g.country_id == country.id) {
            combinations.extend(country_subjects.iter().map(|subject| Combination {
                country_id: country.id,
                grade_id: grade.id,
                subject_id: subject.id,
            }));
        }
    }
    combinations
}
