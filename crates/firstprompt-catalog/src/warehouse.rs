use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use firstprompt_common::{Country, Error, Grade, Language, Result, Subject};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::files;

const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com";

/// Pull-only source of truth for the reference tables.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    fn source_id(&self) -> &str;
    async fn fetch_countries(&self) -> Result<Vec<Country>>;
    async fn fetch_subjects(&self) -> Result<Vec<Subject>>;
    async fn fetch_grades(&self) -> Result<Vec<Grade>>;
    async fn fetch_languages(&self) -> Result<Vec<Language>>;
}

/// Row counts written by [`download_reference_data`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub countries: usize,
    pub subjects: usize,
    pub grades: usize,
    pub languages: usize,
}

/// Fetch every reference table and overwrite the CSV files in `data_dir`.
///
/// All four tables are fetched before any file is written, so a failed
/// query leaves the previous files consistent with each other.
pub async fn download_reference_data(
    source: &dyn ReferenceSource,
    data_dir: &Path,
) -> Result<DownloadReport> {
    let countries = source.fetch_countries().await?;
    let subjects = source.fetch_subjects().await?;
    let grades = source.fetch_grades().await?;
    let languages = source.fetch_languages().await?;
    info!(
        "downloaded {} countries, {} subjects, {} grades, {} languages from {}",
        countries.len(),
        subjects.len(),
        grades.len(),
        languages.len(),
        source.source_id()
    );

    std::fs::create_dir_all(data_dir)?;
    files::save_countries(data_dir, &countries)?;
    files::save_subjects(data_dir, &subjects)?;
    files::save_grades(data_dir, &grades)?;
    files::save_languages(data_dir, &languages)?;

    Ok(DownloadReport {
        countries: countries.len(),
        subjects: subjects.len(),
        grades: grades.len(),
        languages: languages.len(),
    })
}

/// BigQuery REST (`jobs.query`) backed reference source.
pub struct BigQuerySource {
    client: reqwest::Client,
    access_token: String,
    project: String,
    dataset: String,
    base_url: String,
}

impl BigQuerySource {
    pub fn new(
        access_token: impl Into<String>,
        project: impl Into<String>,
        dataset: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            access_token: access_token.into(),
            project: project.into(),
            dataset: dataset.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn query_endpoint(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/queries",
            self.base_url.trim_end_matches('/'),
            self.project
        )
    }

    fn results_endpoint(&self, job_id: &str) -> String {
        format!("{}/{}", self.query_endpoint(), job_id)
    }

    fn table(&self, name: &str) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, name)
    }

    #[instrument(skip(self, sql))]
    async fn run_query(&self, sql: String) -> Result<Vec<Vec<Option<String>>>> {
        debug!("bigquery query: {sql}");
        let response = self
            .client
            .post(self.query_endpoint())
            .bearer_auth(&self.access_token)
            .json(&QueryRequest {
                query: sql,
                use_legacy_sql: false,
            })
            .send()
            .await
            .map_err(|e| Error::Warehouse(format!("bigquery request failed: {e}")))?;

        let mut page = parse_response(response).await?;
        if !page.job_complete {
            return Err(Error::Warehouse(
                "bigquery job did not complete within the request timeout".into(),
            ));
        }

        let mut rows = page.take_rows();
        while let Some(token) = page.page_token.take() {
            let job = page.job_reference.take().ok_or_else(|| {
                Error::Warehouse("paged bigquery response without a job reference".into())
            })?;

            let mut request = self
                .client
                .get(self.results_endpoint(&job.job_id))
                .bearer_auth(&self.access_token)
                .query(&[("pageToken", token.as_str())]);
            if let Some(location) = &job.location {
                request = request.query(&[("location", location.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Warehouse(format!("bigquery page request failed: {e}")))?;
            page = parse_response(response).await?;
            page.job_reference.get_or_insert(job);
            rows.extend(page.take_rows());
        }

        Ok(rows)
    }
}

#[async_trait]
impl ReferenceSource for BigQuerySource {
    fn source_id(&self) -> &str {
        "bigquery"
    }

    async fn fetch_countries(&self) -> Result<Vec<Country>> {
        let rows = self
            .run_query(format!("SELECT id, english_name FROM {}", self.table("country")))
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Country {
                    id: id_cell(row, 0)?,
                    name: text_cell(row, 1),
                })
            })
            .collect()
    }

    async fn fetch_subjects(&self) -> Result<Vec<Subject>> {
        let rows = self
            .run_query(format!(
                "SELECT id, country_id, long_name FROM {}",
                self.table("subject")
            ))
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Subject {
                    id: id_cell(row, 0)?,
                    country_id: id_cell(row, 1)?,
                    name: text_cell(row, 2),
                })
            })
            .collect()
    }

    async fn fetch_grades(&self) -> Result<Vec<Grade>> {
        let rows = self
            .run_query(format!(
                "SELECT id, country_id, long_name FROM {}",
                self.table("grade")
            ))
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Grade {
                    id: id_cell(row, 0)?,
                    country_id: id_cell(row, 1)?,
                    name: text_cell(row, 2),
                })
            })
            .collect()
    }

    async fn fetch_languages(&self) -> Result<Vec<Language>> {
        let rows = self
            .run_query(format!("SELECT id, english_name FROM {}", self.table("language")))
            .await?;
        rows.iter()
            .filter(|row| {
                let has_id = row.first().is_some_and(Option::is_some);
                if !has_id {
                    debug!("skipping language row without id: {row:?}");
                }
                has_id
            })
            .map(|row| {
                Ok(Language {
                    id: id_cell(row, 0)?,
                    name: text_cell(row, 1),
                })
            })
            .collect()
    }
}

async fn parse_response(response: reqwest::Response) -> Result<QueryResponse> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Warehouse(format!(
            "bigquery API error: status={status}, body={body}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| Error::Warehouse(format!("failed to parse bigquery response: {e}")))
}

fn id_cell(row: &[Option<String>], index: usize) -> Result<i64> {
    let value = row
        .get(index)
        .and_then(|v| v.as_deref())
        .ok_or_else(|| Error::Warehouse(format!("missing id in column {index}")))?;
    value
        .parse()
        .map_err(|_| Error::Warehouse(format!("invalid id '{value}' in column {index}")))
}

fn text_cell(row: &[Option<String>], index: usize) -> String {
    row.get(index).cloned().flatten().unwrap_or_default()
}

// --- BigQuery Wire Types (private) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default = "default_job_complete")]
    job_complete: bool,
    #[serde(default)]
    rows: Option<Vec<TableRow>>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    job_reference: Option<JobReference>,
}

fn default_job_complete() -> bool {
    true
}

impl QueryResponse {
    fn take_rows(&mut self) -> Vec<Vec<Option<String>>> {
        self.rows
            .take()
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.f.into_iter().map(|cell| cell.v).collect())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Option<String>,
}
