use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use firstprompt_catalog::{
    BigQuerySource, ReferenceCatalog, download_reference_data, load_combinations,
    write_combination_files,
};
use firstprompt_config::AppConfig;
use firstprompt_db::MessageStore;
use firstprompt_generation::build_client;
use firstprompt_pipeline::{
    GenerationContext, StageReport, read_message_checkpoint, read_topic_checkpoint,
};
use tracing::info;

pub fn topic_checkpoint_path(data_dir: &Path, country_id: i64) -> PathBuf {
    data_dir.join(format!("topics_{country_id}.csv"))
}

pub fn message_checkpoint_path(data_dir: &Path, country_id: i64) -> PathBuf {
    data_dir.join(format!("messages_{country_id}.csv"))
}

pub async fn download_data(config: &AppConfig) -> Result<()> {
    let token = config
        .warehouse
        .access_token
        .clone()
        .context("warehouse.access_token (or BIGQUERY_ACCESS_TOKEN) is required")?;
    let source = BigQuerySource::new(
        token,
        config.warehouse.project.as_str(),
        config.warehouse.dataset.as_str(),
        config.warehouse.base_url.clone(),
        Duration::from_secs(config.warehouse.timeout_secs),
    );

    println!("Downloading reference data from BigQuery...");
    let report = download_reference_data(&source, &config.data_dir).await?;
    println!(
        "Downloaded {} countries, {} subjects, {} grades, {} languages into {}",
        report.countries,
        report.subjects,
        report.grades,
        report.languages,
        config.data_dir.display()
    );
    Ok(())
}

pub fn make_combinations(config: &AppConfig) -> Result<()> {
    println!("Creating combination files...");
    let catalog = ReferenceCatalog::load(&config.data_dir)?;
    let written = write_combination_files(&config.data_dir, &catalog)?;
    println!("Wrote {written} combination files");
    Ok(())
}

fn context(
    config: &AppConfig,
    concurrency: Option<usize>,
) -> Result<(Arc<ReferenceCatalog>, GenerationContext)> {
    let catalog = Arc::new(ReferenceCatalog::load(&config.data_dir)?);
    let client = build_client(&config.generation)?;
    let mut ctx = GenerationContext::new(Arc::clone(&catalog), client, config);
    if let Some(concurrency) = concurrency {
        ctx = ctx.with_concurrency(concurrency);
    }
    Ok((catalog, ctx))
}

pub async fn generate_topics(
    config: &AppConfig,
    country: &str,
    concurrency: Option<usize>,
    resume: bool,
) -> Result<()> {
    let (catalog, ctx) = context(config, concurrency)?;
    let country_id = catalog.country_id_by_name(country)?;
    let combinations = load_combinations(&config.data_dir, country_id)
        .with_context(|| format!("no combinations for {country}; run make-combinations first"))?;
    let path = topic_checkpoint_path(&config.data_dir, country_id);

    println!(
        "Generating topics for {country} ({} combinations)...",
        combinations.len()
    );
    let report = firstprompt_pipeline::generate_topics(&ctx, combinations, &path, resume).await?;
    print_stage_report("Topics", &report, &path);
    Ok(())
}

pub async fn generate_prompts(
    config: &AppConfig,
    country: &str,
    concurrency: Option<usize>,
    and_upload: bool,
) -> Result<()> {
    let (catalog, ctx) = context(config, concurrency)?;
    let country_id = catalog.country_id_by_name(country)?;
    let topics_path = topic_checkpoint_path(&config.data_dir, country_id);
    let topics = read_topic_checkpoint(&topics_path)
        .with_context(|| format!("no topics for {country}; run generate-topics first"))?;
    let path = message_checkpoint_path(&config.data_dir, country_id);

    println!("Generating prompts for {country} ({} topics)...", topics.len());
    let report = firstprompt_pipeline::generate_prompts(&ctx, country_id, topics, &path).await?;
    print_stage_report("Prompts", &report, &path);

    if and_upload {
        println!("Uploading prompts to the database...");
        upload(config, &path, None)?;
    } else {
        println!("Skipping upload. Prompts are saved in {}", path.display());
    }
    Ok(())
}

pub fn upload(config: &AppConfig, file: &Path, batch_size: Option<usize>) -> Result<()> {
    let messages = read_message_checkpoint(file)?;
    let store = MessageStore::open(&config.database.path)?;
    let batch_size = batch_size.unwrap_or(config.database.batch_size);

    info!(
        "uploading {} messages from {} in batches of {batch_size}",
        messages.len(),
        file.display()
    );
    let report = store.upload(&messages, batch_size)?;
    report.print_summary();
    Ok(())
}

pub fn check_db(config: &AppConfig) -> Result<()> {
    let store = MessageStore::open(&config.database.path)?;
    store.test_connection()?;
    println!(
        "Database {} is reachable ({} messages stored)",
        config.database.path.display(),
        store.count()?
    );
    Ok(())
}

fn print_stage_report(stage: &str, report: &StageReport, path: &Path) {
    println!(
        "{stage}: {} succeeded, {} errors, {} rows written to {}",
        report.succeeded,
        report.failed,
        report.rows_written,
        path.display()
    );
    if report.skipped > 0 {
        println!("  {} inputs skipped (already in checkpoint)", report.skipped);
    }
    for e in report.errors.iter().chain(&report.checkpoint_errors) {
        println!("  - {e}");
    }
}
