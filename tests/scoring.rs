//! Similarity scoring, selection and model loading tests.

mod common;

use std::sync::{Arc, atomic::Ordering};

use clip_thumbnailer::{
    Candidate, Embedding, ErrorKind, ModelHandle, Prompt, ThumbnailError, normalize_similarity,
    score_candidates, select_best,
};

use common::{CountingLoader, FakeModel, frame_for};

fn candidates_at(timestamps: &[f64]) -> Vec<Candidate> {
    timestamps
        .iter()
        .map(|&timestamp| Candidate::new(timestamp, frame_for(timestamp, 8, 8)))
        .collect()
}

fn scored(timestamp: f64, score: Option<f32>) -> Candidate {
    let mut candidate = Candidate::new(timestamp, frame_for(timestamp, 4, 4));
    candidate.score = score;
    candidate
}

// ── Embedding math ─────────────────────────────────────────────────

#[test]
fn cosine_of_parallel_and_opposite_vectors() {
    let a = Embedding(vec![1.0, 2.0, 3.0]);
    let b = Embedding(vec![2.0, 4.0, 6.0]);
    let c = Embedding(vec![-1.0, -2.0, -3.0]);

    assert!((a.cosine(&b) - 1.0).abs() < 1e-6);
    assert!((a.cosine(&c) + 1.0).abs() < 1e-6);
}

#[test]
fn cosine_of_degenerate_vectors_is_zero() {
    let zero = Embedding(vec![0.0, 0.0]);
    let unit = Embedding(vec![1.0, 0.0]);
    let longer = Embedding(vec![1.0, 0.0, 0.0]);

    assert_eq!(zero.cosine(&unit), 0.0);
    assert_eq!(unit.cosine(&longer), 0.0);
}

#[test]
fn normalized_similarity_range() {
    assert_eq!(normalize_similarity(-1.0), 0.0);
    assert_eq!(normalize_similarity(0.0), 0.5);
    assert_eq!(normalize_similarity(1.0), 1.0);
    assert_eq!(normalize_similarity(3.0), 1.0);
}

// ── Prompt ─────────────────────────────────────────────────────────

#[test]
fn blank_prompt_is_rejected() {
    assert!(Prompt::new("   ").is_none());
    assert!(Prompt::from_phrases(Vec::<String>::new()).is_none());
}

#[test]
fn prompt_phrases_are_trimmed_and_deduplicated() {
    let prompt = Prompt::from_phrases(["a cat", " a cat ", "", "a dog"]).expect("non-blank");
    assert_eq!(prompt.phrases(), ["a cat", "a dog"]);
}

#[test]
fn default_phrases_are_distinct() {
    let prompt = Prompt::default_phrases();
    assert!(prompt.phrases().len() > 1);
    let rebuilt = Prompt::from_phrases(prompt.phrases().to_vec()).expect("non-blank");
    assert_eq!(rebuilt, prompt);
}

// ── Scoring ────────────────────────────────────────────────────────

#[tokio::test]
async fn scores_every_candidate_with_one_image_batch() {
    let model = FakeModel::new(75);
    let prompt = Prompt::from_phrases(["goal", "goal", "celebration"]).expect("non-blank");
    let mut candidates = candidates_at(&[0.0, 2.5, 5.0, 7.5, 10.0]);

    score_candidates(&model, &prompt, &mut candidates)
        .await
        .expect("Failed to score");

    assert_eq!(model.text_calls.load(Ordering::SeqCst), 1);
    assert_eq!(model.texts_embedded.load(Ordering::SeqCst), 2);
    assert_eq!(model.image_calls.load(Ordering::SeqCst), 1);
    assert_eq!(model.images_embedded.load(Ordering::SeqCst), 5);
    for candidate in &candidates {
        let score = candidate.score.expect("scored");
        assert!((0.0..=1.0).contains(&score), "score {score} out of range");
    }
}

#[tokio::test]
async fn best_matching_frame_wins() {
    let model = FakeModel::new(75);
    let prompt = Prompt::new("the moment at 7.5 seconds").expect("non-blank");
    let mut candidates = candidates_at(&[0.0, 2.5, 5.0, 7.5, 10.0]);

    score_candidates(&model, &prompt, &mut candidates)
        .await
        .expect("Failed to score");
    let selection = select_best(candidates).expect("non-empty");

    assert_eq!(selection.best.timestamp, 7.5);
    assert_eq!(selection.scores.len(), 5);
    let best = selection.best.score.expect("scored");
    assert!(selection.scores.iter().all(|entry| entry.score <= best));
}

#[tokio::test]
async fn empty_candidate_list_skips_the_model() {
    let model = FakeModel::new(0);
    let prompt = Prompt::new("anything").expect("non-blank");

    score_candidates(&model, &prompt, &mut [])
        .await
        .expect("Failed to score");
    assert_eq!(model.text_calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.image_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn embedding_count_mismatch_is_scoring_unavailable() {
    let mut model = FakeModel::new(10);
    model.short_batches = true;
    let prompt = Prompt::new("anything").expect("non-blank");
    let mut candidates = candidates_at(&[1.0, 2.0, 3.0]);

    let error = score_candidates(&model, &prompt, &mut candidates)
        .await
        .expect_err("mismatch must fail");
    assert_eq!(error.kind(), ErrorKind::ScoringUnavailable);
    assert!(error.requires_explicit_timestamp());
}

// ── Selection ──────────────────────────────────────────────────────

#[tokio::test]
async fn ties_go_to_the_earliest_timestamp() {
    let model = FakeModel::uniform();
    let prompt = Prompt::new("anything").expect("non-blank");
    let mut candidates = candidates_at(&[9.0, 3.0, 6.0]);

    score_candidates(&model, &prompt, &mut candidates)
        .await
        .expect("Failed to score");
    let selection = select_best(candidates).expect("non-empty");

    assert_eq!(selection.best.timestamp, 3.0);
    let order: Vec<f64> = selection.scores.iter().map(|entry| entry.timestamp).collect();
    assert_eq!(order, vec![3.0, 6.0, 9.0]);
}

#[test]
fn non_finite_scores_never_win() {
    let candidates = vec![
        scored(1.0, Some(f32::NAN)),
        scored(2.0, Some(0.3)),
        scored(3.0, Some(f32::INFINITY)),
        scored(4.0, None),
    ];
    let selection = select_best(candidates).expect("non-empty");
    assert_eq!(selection.best.timestamp, 2.0);
}

#[test]
fn nothing_is_selected_without_a_finite_score() {
    assert!(select_best(vec![scored(5.0, None), scored(1.0, None)]).is_none());
    assert!(select_best(vec![scored(1.0, Some(f32::NAN)), scored(2.0, Some(f32::INFINITY))]).is_none());
}

#[test]
fn select_best_of_nothing() {
    assert!(select_best(Vec::new()).is_none());
}

// ── Model handle ───────────────────────────────────────────────────

#[tokio::test]
async fn model_loads_once_under_concurrency() {
    let mut loader = CountingLoader::new(0);
    loader.delay = std::time::Duration::from_millis(20);
    let loader = Arc::new(loader);
    let handle = Arc::new(ModelHandle::new(loader.clone()));
    assert!(!handle.is_loaded());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.get().await.map(|model| model.name().to_string()) })
        })
        .collect();
    for task in tasks {
        let name = task.await.expect("task panicked").expect("model loads");
        assert_eq!(name, "fake-clip");
    }

    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert!(handle.is_loaded());
}

#[tokio::test]
async fn failed_load_is_retried_on_next_use() {
    let mut loader = CountingLoader::new(0);
    loader.failures = 1;
    let loader = Arc::new(loader);
    let handle = ModelHandle::new(loader.clone());

    let first = handle.get().await;
    assert!(matches!(first, Err(ThumbnailError::ScoringUnavailable(_))));
    assert!(!handle.is_loaded());

    handle.get().await.expect("second load succeeds");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    assert!(handle.is_loaded());
}

#[tokio::test]
async fn disabled_model_is_scoring_unavailable() {
    let handle = ModelHandle::disabled();
    let error = handle.get().await.err().expect("disabled handle fails");
    assert!(error.requires_explicit_timestamp());
}

#[tokio::test]
async fn preloaded_model_is_ready() {
    let handle = ModelHandle::preloaded(Arc::new(FakeModel::new(0)));
    assert!(handle.is_loaded());
    handle.get().await.expect("preloaded");
}
