use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use firstprompt_catalog::ReferenceCatalog;
use firstprompt_common::{Combination, Country, Error, GenerationError, Grade, Language, Subject, TopicRecord};
use firstprompt_generation::{GenerationClient, GenerationResult, PromptRequest, TopicRequest};
use firstprompt_pipeline::{
    BatchOptions, CheckpointWriter, GenerationContext, generate_prompts, generate_topics,
    read_message_checkpoint, read_topic_checkpoint,
};

/// Answers from a fixed script and counts calls.
#[derive(Default)]
struct ScriptedClient {
    topic_calls: AtomicUsize,
    prompt_calls: AtomicUsize,
    failing_subject: Option<&'static str>,
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn generate_topics(&self, request: &TopicRequest) -> GenerationResult<Vec<String>> {
        self.topic_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_subject == Some(request.subject.as_str()) {
            return Err(GenerationError::Timeout("deadline exceeded".into()));
        }
        match (request.subject.as_str(), request.grade.as_str()) {
            ("Biology", "Klasse 5") => Ok(vec!["Photosynthesis".into(), "Cell Division".into()]),
            (subject, grade) => Ok(vec![format!("{subject} in {grade}")]),
        }
    }

    async fn generate_suggested_prompts(
        &self,
        request: &PromptRequest,
    ) -> GenerationResult<Vec<String>> {
        self.prompt_calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..request.count)
            .map(|n| format!("💬 {} #{n} ({})", request.topic, request.language))
            .collect())
    }
}

fn germany_catalog() -> ReferenceCatalog {
    let grade = |id, name: &str| Grade {
        id,
        country_id: 1,
        name: name.into(),
    };
    let subject = |id, name: &str| Subject {
        id,
        country_id: 1,
        name: name.into(),
    };

    ReferenceCatalog::new(
        vec![
            Country {
                id: 1,
                name: "Germany".into(),
            },
            Country {
                id: 2,
                name: "Austria".into(),
            },
        ],
        vec![subject(10, "Biology"), subject(11, "Chemistry")],
        vec![grade(5, "Klasse 5"), grade(6, "Klasse 6")],
        vec![
            Language {
                id: 1,
                name: "German".into(),
            },
            Language {
                id: 2,
                name: "English".into(),
            },
        ],
        HashMap::from([(1, vec![1, 2])]),
    )
}

fn context(client: Arc<ScriptedClient>) -> GenerationContext {
    GenerationContext {
        catalog: Arc::new(germany_catalog()),
        client,
        options: BatchOptions {
            concurrency: 3,
            max_attempts: 1,
            retry_backoff: Duration::from_millis(1),
            progress_every: 2,
        },
        topics_per_combination: 15,
        prompts_per_topic: 3,
    }
}

const BIOLOGY_5: Combination = Combination {
    country_id: 1,
    grade_id: 5,
    subject_id: 10,
};

#[tokio::test]
async fn germany_biology_topics_are_checkpointed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topics_1.csv");
    let ctx = context(Arc::new(ScriptedClient::default()));

    let report = generate_topics(&ctx, vec![BIOLOGY_5], &path, false)
        .await
        .unwrap();

    assert_eq!(report.inputs, 1);
    assert_eq!(report.rows_written, 2);
    assert_eq!(
        read_topic_checkpoint(&path).unwrap(),
        vec![
            TopicRecord::new(BIOLOGY_5, "Photosynthesis"),
            TopicRecord::new(BIOLOGY_5, "Cell Division"),
        ]
    );
}

#[tokio::test]
async fn failing_combinations_do_not_stop_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topics_1.csv");
    let client = Arc::new(ScriptedClient {
        failing_subject: Some("Chemistry"),
        ..ScriptedClient::default()
    });
    let ctx = context(Arc::clone(&client));
    let combinations = ctx.catalog.combinations_for_country(1);
    assert_eq!(combinations.len(), 4);

    let report = generate_topics(&ctx, combinations, &path, false)
        .await
        .unwrap();

    assert_eq!(client.topic_calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|e| e.contains("timed out")));
    assert!(report.checkpoint_errors.is_empty());

    let rows = read_topic_checkpoint(&path).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.subject_id == 10));
}

#[tokio::test]
async fn resume_skips_combinations_already_in_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topics_1.csv");
    let writer = CheckpointWriter::create(&path).unwrap();
    writer
        .append(&[TopicRecord::new(BIOLOGY_5, "Photosynthesis")])
        .unwrap();
    drop(writer);

    let client = Arc::new(ScriptedClient::default());
    let ctx = context(Arc::clone(&client));
    let combinations = ctx.catalog.combinations_for_country(1);

    let report = generate_topics(&ctx, combinations, &path, true)
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.inputs, 3);
    assert_eq!(client.topic_calls.load(Ordering::SeqCst), 3);

    let rows = read_topic_checkpoint(&path).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].topic, "Photosynthesis");
    let covered: HashSet<Combination> = rows.iter().map(TopicRecord::combination).collect();
    assert_eq!(covered.len(), 4);
}

#[tokio::test]
async fn resume_recovers_from_a_torn_last_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topics_1.csv");
    std::fs::write(
        &path,
        "country_id,grade_id,subject_id,topic\n1,5,10,Photosynthesis\n1,5,11,\"Acids and",
    )
    .unwrap();

    let client = Arc::new(ScriptedClient::default());
    let ctx = context(Arc::clone(&client));
    let combinations = ctx.catalog.combinations_for_country(1);

    let report = generate_topics(&ctx, combinations, &path, true)
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(client.topic_calls.load(Ordering::SeqCst), 3);

    let rows = read_topic_checkpoint(&path).unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| !r.topic.starts_with("Acids")));
    let covered: HashSet<Combination> = rows.iter().map(TopicRecord::combination).collect();
    assert_eq!(covered.len(), 4);
}

#[tokio::test]
async fn prompts_are_generated_per_topic_and_language() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("messages_1.csv");
    let client = Arc::new(ScriptedClient::default());
    let ctx = context(Arc::clone(&client));

    let topics = vec![
        TopicRecord::new(BIOLOGY_5, "Photosynthesis"),
        TopicRecord::new(BIOLOGY_5, "Cell Division"),
    ];
    let report = generate_prompts(&ctx, 1, topics, &path).await.unwrap();

    assert_eq!(client.prompt_calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.inputs, 4);
    assert_eq!(report.rows_written, 12);

    let messages = read_message_checkpoint(&path).unwrap();
    assert_eq!(messages.len(), 12);
    let uuids: HashSet<_> = messages.iter().map(|m| m.uuid).collect();
    assert_eq!(uuids.len(), 12);

    for message in &messages {
        assert_eq!(
            (message.country_id, message.grade_id, message.subject_id),
            (1, 5, 10)
        );
        let expected_language = if message.message.ends_with("(German)") { 1 } else { 2 };
        assert_eq!(message.language_id, expected_language);
    }
}

#[tokio::test]
async fn country_without_languages_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("messages_2.csv");
    let client = Arc::new(ScriptedClient::default());
    let ctx = context(Arc::clone(&client));

    let topic = TopicRecord {
        country_id: 2,
        grade_id: 5,
        subject_id: 10,
        topic: "Photosynthesis".into(),
    };
    let err = generate_prompts(&ctx, 2, vec![topic], &path)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Lookup(_)));
    assert_eq!(client.prompt_calls.load(Ordering::SeqCst), 0);
    assert!(!path.exists());
}
