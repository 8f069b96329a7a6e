use std::sync::{Arc, Mutex};
use std::time::Duration;

use firstprompt_common::{Combination, GenerationError, TopicRecord};
use firstprompt_pipeline::{BatchOptions, BatchOrchestrator, CheckpointWriter, read_topic_checkpoint};

fn options(concurrency: usize) -> BatchOptions {
    BatchOptions {
        concurrency,
        max_attempts: 1,
        retry_backoff: Duration::from_millis(1),
        progress_every: 1,
    }
}

#[tokio::test]
async fn timed_out_item_resolves_empty_and_still_gets_its_callback() {
    let mut fired = Vec::new();

    let outcome = BatchOrchestrator::new(options(2))
        .run(
            (0..5).collect::<Vec<usize>>(),
            |n| async move {
                if n == 2 {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    return Err(GenerationError::Timeout("request exceeded 120s".into()));
                }
                Ok(vec![format!("topic {n}")])
            },
            |index, items| {
                fired.push((index, items.len()));
                Ok(())
            },
        )
        .await;

    assert_eq!(outcome.results.len(), 5);
    assert!(outcome.results[2].is_empty());
    assert_eq!(outcome.results[4], vec!["topic 4"]);

    fired.sort_unstable();
    assert_eq!(fired, vec![(0, 1), (1, 1), (2, 0), (3, 1), (4, 1)]);

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 2);
    assert!(outcome.failures[0].error.contains("timed out"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn checkpoint_holds_one_header_after_many_concurrent_completions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topics.csv");
    let writer = CheckpointWriter::<TopicRecord>::create(&path).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let combinations: Vec<Combination> = (0..60)
        .map(|n| Combination {
            country_id: 1,
            grade_id: n / 10,
            subject_id: n,
        })
        .collect();

    let outcome = BatchOrchestrator::new(options(16))
        .run(
            combinations.clone(),
            |c: Combination| async move {
                tokio::time::sleep(Duration::from_millis((c.subject_id as u64 * 5) % 17)).await;
                Ok(vec![format!("topic a, {}", c.subject_id), format!("topic \"b\" {}", c.subject_id)])
            },
            |index, topics| {
                order.lock().unwrap().push(index);
                let rows: Vec<TopicRecord> = topics
                    .iter()
                    .map(|t| TopicRecord::new(combinations[index], t.as_str()))
                    .collect();
                writer.append(&rows)?;
                Ok(())
            },
        )
        .await;

    assert_eq!(outcome.succeeded(), 60);
    assert_eq!(order.lock().unwrap().len(), 60);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.matches("country_id,grade_id,subject_id,topic").count(), 1);

    let rows = read_topic_checkpoint(&path).unwrap();
    assert_eq!(rows.len(), 120);
    for row in &rows {
        assert!(row.topic.ends_with(&row.subject_id.to_string()));
        assert_eq!(row.grade_id, row.subject_id / 10);
    }
}
