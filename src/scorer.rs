//! Prompt-to-frame similarity scoring.
//!
//! The scorer embeds every distinct phrasing of the [`Prompt`] exactly once,
//! embeds all candidate frames in one batched call, and scores each frame by
//! the mean normalized cosine similarity against the prompt embeddings.
//! [`select_best`] then picks the strictly highest score, preferring the
//! earliest timestamp on exact ties.

use async_trait::async_trait;
use image::RgbImage;
use serde::Serialize;

use crate::{error::ThumbnailError, sampler::Candidate};

/// Generic phrasings used when the caller asks for an automatic pick
/// without describing a subject.
const DEFAULT_PHRASES: [&str; 3] = [
    "The most interesting and engaging frame from the video",
    "A frame showing the main subject clearly",
    "The frame with the most visual activity and highest image quality",
];

/// A vector embedding produced by a similarity model.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Euclidean norm.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|value| value * value).sum::<f32>().sqrt()
    }

    /// Cosine similarity in `[-1, 1]`.
    ///
    /// Zero vectors and mismatched dimensions yield `0.0`; the model contract
    /// is violated in both cases and neither should ever win a selection.
    pub fn cosine(&self, other: &Embedding) -> f32 {
        if self.0.len() != other.0.len() {
            return 0.0;
        }
        let denominator = self.norm() * other.norm();
        if denominator <= f32::EPSILON {
            return 0.0;
        }
        let dot: f32 = self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum();
        (dot / denominator).clamp(-1.0, 1.0)
    }
}

/// Map a cosine similarity from `[-1, 1]` onto the score range `[0, 1]`.
pub fn normalize_similarity(cosine: f32) -> f32 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Caller-supplied description of the wanted frame.
///
/// Holds one or more phrasings. Duplicates are removed on construction so no
/// text is ever embedded twice in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    phrases: Vec<String>,
}

impl Prompt {
    /// A single-phrase prompt. Returns `None` for blank text.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        Self::from_phrases([text.into()])
    }

    /// A multi-phrase prompt. Blank and repeated phrases are dropped; returns
    /// `None` if nothing is left.
    pub fn from_phrases<I, S>(phrases: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for phrase in phrases {
            let phrase = phrase.into().trim().to_string();
            if !phrase.is_empty() && !unique.contains(&phrase) {
                unique.push(phrase);
            }
        }
        (!unique.is_empty()).then_some(Self { phrases: unique })
    }

    /// The generic "pick a good frame" phrasings.
    pub fn default_phrases() -> Self {
        Self {
            phrases: DEFAULT_PHRASES.iter().map(|phrase| phrase.to_string()).collect(),
        }
    }

    /// Distinct phrasings in insertion order.
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

/// A CLIP-style model embedding text and images into one comparable space.
///
/// One instance is shared read-only by every concurrent request.
#[async_trait]
pub trait SimilarityModel: Send + Sync {
    /// Embed each text; the result has one embedding per input, in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, ThumbnailError>;

    /// Embed a batch of images in as few inference passes as the model
    /// allows; one embedding per input, in order.
    async fn embed_images(&self, images: &[&RgbImage]) -> Result<Vec<Embedding>, ThumbnailError>;

    /// Human-readable model identifier for logs.
    fn name(&self) -> &str;
}

/// Per-candidate result of a scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreEntry {
    /// Candidate timestamp in seconds.
    pub timestamp: f64,
    /// Normalized similarity in `[0, 1]`.
    pub score: f32,
}

/// The winning candidate plus the full ranking for diagnostics.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The selected candidate, with its score filled in.
    pub best: Candidate,
    /// Scores of every candidate, in timestamp order.
    pub scores: Vec<ScoreEntry>,
}

/// Annotate every candidate with its similarity to `prompt`.
///
/// # Errors
///
/// [`ThumbnailError::ScoringUnavailable`] if the model fails or returns the
/// wrong number of embeddings.
pub async fn score_candidates(
    model: &dyn SimilarityModel,
    prompt: &Prompt,
    candidates: &mut [Candidate],
) -> Result<(), ThumbnailError> {
    if candidates.is_empty() {
        return Ok(());
    }
    log::debug!(
        "Scoring {} candidates against {} phrase(s) with {}",
        candidates.len(),
        prompt.phrases().len(),
        model.name()
    );

    let text_embeddings = model
        .embed_texts(prompt.phrases())
        .await
        .map_err(ThumbnailError::into_scoring_unavailable)?;
    if text_embeddings.len() != prompt.phrases().len() {
        return Err(ThumbnailError::ScoringUnavailable(format!(
            "model returned {} text embeddings for {} phrases",
            text_embeddings.len(),
            prompt.phrases().len()
        )));
    }

    let images: Vec<&RgbImage> = candidates.iter().map(|candidate| &candidate.image).collect();
    let image_embeddings = model
        .embed_images(&images)
        .await
        .map_err(ThumbnailError::into_scoring_unavailable)?;
    if image_embeddings.len() != candidates.len() {
        return Err(ThumbnailError::ScoringUnavailable(format!(
            "model returned {} image embeddings for {} frames",
            image_embeddings.len(),
            candidates.len()
        )));
    }

    for (candidate, image_embedding) in candidates.iter_mut().zip(&image_embeddings) {
        let total: f32 = text_embeddings
            .iter()
            .map(|text_embedding| normalize_similarity(text_embedding.cosine(image_embedding)))
            .sum();
        candidate.score = Some(total / text_embeddings.len() as f32);
    }
    Ok(())
}

/// Pick the candidate with the strictly highest score.
///
/// Candidates are considered in timestamp order, so on an exact tie the
/// earliest one wins. Unscored and non-finite scores never win. Returns
/// `None` when no candidate carries a finite score, including for an empty
/// input.
pub fn select_best(mut candidates: Vec<Candidate>) -> Option<Selection> {
    candidates.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let scores: Vec<ScoreEntry> = candidates
        .iter()
        .map(|candidate| ScoreEntry {
            timestamp: candidate.timestamp,
            score: candidate.score.unwrap_or(f32::NAN),
        })
        .collect();

    let mut best_index: Option<usize> = None;
    for (index, entry) in scores.iter().enumerate() {
        if !entry.score.is_finite() {
            continue;
        }
        let better = best_index.is_none_or(|best| entry.score > scores[best].score);
        if better {
            best_index = Some(index);
        }
    }

    let best = candidates.swap_remove(best_index?);
    Some(Selection { best, scores })
}
