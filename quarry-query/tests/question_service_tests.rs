//! Tests for the question generation pipeline against in-memory stubs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use quarry_core::prelude::*;
use quarry_query::prelude::*;

/// In-memory question repository backed by a mutex-guarded vec.
#[derive(Debug, Default)]
struct MemoryRepository {
    questions: Mutex<Vec<SuggestedQuestion>>,
}

impl MemoryRepository {
    fn with_existing(collection_id: &str, questions: &[&str]) -> Self {
        let repository = Self::default();
        {
            let mut guard = repository.questions.lock().unwrap();
            for question in questions {
                guard.push(SuggestedQuestion::new(collection_id, *question));
            }
        }
        repository
    }

    fn stored(&self) -> Vec<SuggestedQuestion> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionRepository for MemoryRepository {
    async fn create(&self, question: SuggestedQuestion) -> quarry_core::Result<SuggestedQuestion> {
        self.questions.lock().unwrap().push(question.clone());
        Ok(question)
    }

    async fn get_by_collection(
        &self,
        collection_id: &str,
    ) -> quarry_core::Result<Vec<SuggestedQuestion>> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> quarry_core::Result<()> {
        self.questions.lock().unwrap().retain(|q| q.id != id);
        Ok(())
    }

    async fn delete_by_collection(&self, collection_id: &str) -> quarry_core::Result<usize> {
        let mut guard = self.questions.lock().unwrap();
        let before = guard.len();
        guard.retain(|q| q.collection_id != collection_id);
        Ok(before - guard.len())
    }
}

/// A generator that returns a fixed response and counts its calls.
#[derive(Debug)]
struct CountingGenerator {
    response: Option<String>,
    calls: AtomicUsize,
}

impl CountingGenerator {
    fn returning(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for CountingGenerator {
    async fn generate_text(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> quarry_core::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(QuarryError::llm("provider unavailable")),
        }
    }
}

fn ai_chunks(count: usize) -> Vec<Chunk> {
    (0..count)
        .map(|i| {
            Chunk::new(
                format!("c{i}"),
                "Artificial intelligence systems learn patterns from training data \
                 and apply machine learning models to new inputs.",
                format!("d{i}"),
                i,
            )
        })
        .collect()
}

#[tokio::test]
async fn generates_validates_and_strips_numbering() {
    let generator = Arc::new(CountingGenerator::returning(
        "1. What is artificial intelligence\n\
         2. What is artificial intelligence?\n\
         3. How do machine learning models learn from training data?",
    ));
    let repository = Arc::new(MemoryRepository::default());
    let service = QuestionService::new(generator, repository.clone());

    let created = service
        .suggest_questions("col", &ai_chunks(1))
        .await
        .unwrap();

    let texts: Vec<&str> = created.iter().map(|q| q.question.as_str()).collect();
    // The line without a '?' is rejected; numbering is stripped from the rest.
    assert!(texts.contains(&"What is artificial intelligence?"));
    assert!(texts
        .contains(&"How do machine learning models learn from training data?"));
    assert!(!texts.iter().any(|t| t.starts_with("1.") || t.starts_with("2.")));
    assert_eq!(repository.stored().len(), created.len());
}

#[tokio::test]
async fn capacity_limits_admissions() {
    let existing: Vec<String> = (0..13)
        .map(|i| format!("What is prior question number {i} about machine learning?"))
        .collect();
    let existing_refs: Vec<&str> = existing.iter().map(String::as_str).collect();
    let repository = Arc::new(MemoryRepository::with_existing("col", &existing_refs));

    let generator = Arc::new(CountingGenerator::returning(
        "What are artificial intelligence systems?\n\
         How do models apply machine learning?\n\
         What patterns exist in training data?\n\
         How are new inputs handled by models?",
    ));
    let service = QuestionService::new(generator, repository.clone());

    let created = service
        .suggest_questions("col", &ai_chunks(1))
        .await
        .unwrap();

    // Cap 15 with 13 existing admits at most 2, whatever the candidate volume.
    assert_eq!(created.len(), 2);
    assert_eq!(repository.stored().len(), 15);
}

#[tokio::test]
async fn at_capacity_admits_nothing() {
    let existing: Vec<String> = (0..15)
        .map(|i| format!("What is prior question number {i} about machine learning?"))
        .collect();
    let existing_refs: Vec<&str> = existing.iter().map(String::as_str).collect();
    let repository = Arc::new(MemoryRepository::with_existing("col", &existing_refs));

    let generator = Arc::new(CountingGenerator::returning("What is artificial intelligence?"));
    let service = QuestionService::new(generator.clone(), repository.clone());

    let created = service
        .suggest_questions("col", &ai_chunks(1))
        .await
        .unwrap();

    assert!(created.is_empty());
    // Generation is skipped entirely when no capacity remains.
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn dedups_against_persisted_questions() {
    let repository = Arc::new(MemoryRepository::with_existing(
        "col",
        &["What is artificial intelligence?"],
    ));
    let generator = Arc::new(CountingGenerator::returning(
        "1. what is artificial intelligence?\n\
         How do machine learning models work with training data?",
    ));
    let service = QuestionService::new(generator, repository.clone());

    let created = service
        .suggest_questions("col", &ai_chunks(1))
        .await
        .unwrap();

    // The case/numbering variant of the persisted question is not re-admitted.
    assert_eq!(created.len(), 1);
    assert_eq!(
        created[0].question,
        "How do machine learning models work with training data?"
    );
}

#[tokio::test]
async fn regenerate_deletes_then_creates_fresh() {
    let repository = Arc::new(MemoryRepository::with_existing(
        "col",
        &["What is some stale question about machine learning?"],
    ));
    let generator = Arc::new(CountingGenerator::returning(
        "What are artificial intelligence systems trained on?",
    ));
    let service = QuestionService::new(generator, repository.clone());

    let created = service
        .regenerate_questions("col", &ai_chunks(1))
        .await
        .unwrap();

    assert_eq!(created.len(), 1);
    let stored = repository.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].question,
        "What are artificial intelligence systems trained on?"
    );
}

#[tokio::test]
async fn all_batches_failing_is_an_error() {
    let repository = Arc::new(MemoryRepository::default());
    let generator = Arc::new(CountingGenerator::failing());
    let service = QuestionService::new(generator, repository);

    let err = service
        .suggest_questions("col", &ai_chunks(2))
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::Llm { .. }));
}

#[tokio::test]
async fn empty_chunks_produce_no_questions() {
    let repository = Arc::new(MemoryRepository::default());
    let generator = Arc::new(CountingGenerator::returning("What is this about anyway?"));
    let service = QuestionService::new(generator.clone(), repository);

    let created = service.suggest_questions("col", &[]).await.unwrap();
    assert!(created.is_empty());
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn multi_chunk_input_issues_a_multi_hop_batch() {
    let repository = Arc::new(MemoryRepository::default());
    let generator = Arc::new(CountingGenerator::returning(
        "How do training data patterns shape machine learning models?",
    ));
    let service = QuestionService::with_config(
        generator.clone(),
        repository,
        QuestionConfig {
            // Keep every batch in one packed context so the call count is
            // deterministic: one standard batch plus one multi-hop batch.
            concurrency: 1,
            ..QuestionConfig::default()
        },
    )
    .unwrap();

    service
        .suggest_questions("col", &ai_chunks(3))
        .await
        .unwrap();
    assert_eq!(generator.call_count(), 2);

    // A single chunk gets no multi-hop batch.
    let single_generator = Arc::new(CountingGenerator::returning(
        "How do training data patterns shape machine learning models?",
    ));
    let single_service = QuestionService::new(
        single_generator.clone(),
        Arc::new(MemoryRepository::default()),
    );
    single_service
        .suggest_questions("col", &ai_chunks(1))
        .await
        .unwrap();
    assert_eq!(single_generator.call_count(), 1);
}
