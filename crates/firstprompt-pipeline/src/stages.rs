//! Topic and prompt generation stages built on the batch orchestrator.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use firstprompt_catalog::ReferenceCatalog;
use firstprompt_common::{Combination, Error, Result, SuggestedMessage, TopicRecord};
use firstprompt_config::AppConfig;
use firstprompt_generation::{GenerationClient, PromptRequest, TopicRequest};
use tracing::info;

use crate::batch::{BatchOptions, BatchOrchestrator, BatchOutcome};
use crate::checkpoint::{CheckpointWriter, recover_checkpoint};

/// Everything a stage needs to talk to the model.
#[derive(Clone)]
pub struct GenerationContext {
    pub catalog: Arc<ReferenceCatalog>,
    pub client: Arc<dyn GenerationClient>,
    pub options: BatchOptions,
    pub topics_per_combination: usize,
    pub prompts_per_topic: usize,
}

impl GenerationContext {
    pub fn new(
        catalog: Arc<ReferenceCatalog>,
        client: Arc<dyn GenerationClient>,
        config: &AppConfig,
    ) -> Self {
        Self {
            catalog,
            client,
            options: BatchOptions::from(&config.pipeline),
            topics_per_combination: config.generation.topics_per_combination,
            prompts_per_topic: config.generation.prompts_per_topic,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = concurrency;
        self
    }
}

/// Summary of one stage run, printed by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Inputs submitted to the model.
    pub inputs: usize,
    /// Inputs left out because a resumed checkpoint already covers them.
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows_written: usize,
    pub errors: Vec<String>,
    pub checkpoint_errors: Vec<String>,
}

impl StageReport {
    fn from_outcome(outcome: &BatchOutcome, skipped: usize, rows_written: usize) -> Self {
        Self {
            inputs: outcome.len(),
            skipped,
            succeeded: outcome.succeeded(),
            failed: outcome.failures.len(),
            rows_written,
            errors: outcome
                .failures
                .iter()
                .map(|f| format!("item {}: {}", f.index, f.error))
                .collect(),
            checkpoint_errors: outcome
                .callback_errors
                .iter()
                .map(|f| format!("item {}: {}", f.index, f.error))
                .collect(),
        }
    }
}

/// Generate topics for every combination and append them to `checkpoint`.
///
/// With `resume`, the existing checkpoint is kept and combinations that
/// already have rows in it are not sent again. A torn last row left by a
/// crash is dropped first.
pub async fn generate_topics(
    ctx: &GenerationContext,
    combinations: Vec<Combination>,
    checkpoint: &Path,
    resume: bool,
) -> Result<StageReport> {
    let (writer, combinations, skipped) = if resume {
        let writer = CheckpointWriter::<TopicRecord>::resume(checkpoint)?;
        let done: HashSet<Combination> = recover_checkpoint::<TopicRecord>(checkpoint)?
            .iter()
            .map(TopicRecord::combination)
            .collect();
        let total = combinations.len();
        let remaining: Vec<Combination> = combinations
            .into_iter()
            .filter(|c| !done.contains(c))
            .collect();
        let skipped = total - remaining.len();
        info!("resuming: {skipped} of {total} combinations already have topics");
        (writer, remaining, skipped)
    } else {
        (CheckpointWriter::<TopicRecord>::create(checkpoint)?, combinations, 0)
    };

    let requests: Vec<TopicRequest> = combinations
        .iter()
        .map(|c| {
            let names = ctx
                .catalog
                .resolve_names(c.country_id, c.grade_id, c.subject_id);
            TopicRequest {
                subject: names.subject,
                grade: names.grade,
                country: names.country,
                count: ctx.topics_per_combination,
            }
        })
        .collect();

    let client = Arc::clone(&ctx.client);
    let mut rows_written = 0;
    let outcome = BatchOrchestrator::new(ctx.options.clone())
        .run(
            requests,
            move |request: TopicRequest| {
                let client = Arc::clone(&client);
                async move { client.generate_topics(&request).await }
            },
            |index, topics| {
                let rows: Vec<TopicRecord> = topics
                    .iter()
                    .map(|topic| TopicRecord::new(combinations[index], topic.as_str()))
                    .collect();
                rows_written += writer.append(&rows)?;
                Ok(())
            },
        )
        .await;

    let report = StageReport::from_outcome(&outcome, skipped, rows_written);
    info!(
        "topic generation: {} succeeded, {} errors, {} topics written to {}",
        report.succeeded,
        report.failed,
        report.rows_written,
        checkpoint.display()
    );
    Ok(report)
}

/// Generate suggested prompts for every topic in each of the country's
/// languages and append them to a fresh `checkpoint`.
///
/// Fails before any request is made when the country has no languages.
pub async fn generate_prompts(
    ctx: &GenerationContext,
    country_id: i64,
    topics: Vec<TopicRecord>,
    checkpoint: &Path,
) -> Result<StageReport> {
    let languages = ctx.catalog.languages_for_country(country_id);
    if languages.is_empty() {
        return Err(Error::Lookup(format!(
            "no prompt languages configured for country {country_id}"
        )));
    }

    let writer = CheckpointWriter::<SuggestedMessage>::create(checkpoint)?;

    let capacity = topics.len() * languages.len();
    let mut requests = Vec::with_capacity(capacity);
    let mut targets: Vec<(Combination, i64)> = Vec::with_capacity(capacity);
    for record in &topics {
        let combination = record.combination();
        let names = ctx.catalog.resolve_names(
            combination.country_id,
            combination.grade_id,
            combination.subject_id,
        );
        for language in &languages {
            requests.push(PromptRequest {
                topic: record.topic.clone(),
                country: names.country.clone(),
                grade: names.grade.clone(),
                language: language.name.clone(),
                count: ctx.prompts_per_topic,
            });
            targets.push((combination, language.id));
        }
    }
    info!(
        "generating prompts for {} topics in {} languages",
        topics.len(),
        languages.len()
    );

    let client = Arc::clone(&ctx.client);
    let mut rows_written = 0;
    let outcome = BatchOrchestrator::new(ctx.options.clone())
        .run(
            requests,
            move |request: PromptRequest| {
                let client = Arc::clone(&client);
                async move { client.generate_suggested_prompts(&request).await }
            },
            |index, prompts| {
                let (combination, language_id) = targets[index];
                let rows: Vec<SuggestedMessage> = prompts
                    .iter()
                    .map(|prompt| SuggestedMessage::new(prompt.as_str(), language_id, combination))
                    .collect();
                rows_written += writer.append(&rows)?;
                Ok(())
            },
        )
        .await;

    let report = StageReport::from_outcome(&outcome, 0, rows_written);
    info!(
        "prompt generation: {} succeeded, {} errors, {} prompts written to {}",
        report.succeeded,
        report.failed,
        report.rows_written,
        checkpoint.display()
    );
    Ok(report)
}
