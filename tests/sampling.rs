//! Candidate sampling tests against a synthetic backend.

mod common;

use std::sync::{Arc, Mutex};

use clip_thumbnailer::{
    CancellationToken, MAX_SAMPLE_COUNT, Margin, ProgressCallback, ProgressInfo, SampleSpec,
    Stage, ThumbnailError, sample, sample_timestamps, sample_with_progress,
};

use common::{FakeBackend, red_for};

fn no_margins(count: usize) -> SampleSpec {
    SampleSpec::new(count).with_margins(Margin::Fraction(0.0), Margin::Fraction(0.0))
}

// ── Timestamp planning ─────────────────────────────────────────────

#[test]
fn evenly_spaced_including_both_ends() {
    let timestamps = sample_timestamps(10.0, &no_margins(5));
    assert_eq!(timestamps, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
}

#[test]
fn default_margins_skip_head_and_tail() {
    let spec = SampleSpec::default();
    let timestamps = sample_timestamps(60.0, &spec);

    assert_eq!(timestamps.len(), 12);
    // 2 % of 60 s beats the 0.5 s floor.
    assert!((timestamps[0] - 1.2).abs() < 1e-9);
    assert!((timestamps[11] - 58.8).abs() < 1e-9);
}

#[test]
fn absolute_margins() {
    let spec = SampleSpec::new(3).with_margins(Margin::Seconds(2.0), Margin::Seconds(4.0));
    assert_eq!(sample_timestamps(10.0, &spec), vec![2.0, 4.0, 6.0]);
}

#[test]
fn timestamps_strictly_increase_and_stay_in_range() {
    for duration in [0.9, 3.3, 17.0, 600.0, 7200.5] {
        let timestamps = sample_timestamps(duration, &SampleSpec::new(37));
        assert!(timestamps.windows(2).all(|pair| pair[0] < pair[1]), "{duration}: {timestamps:?}");
        assert!(timestamps.iter().all(|&t| (0.0..=duration).contains(&t)));
    }
}

#[test]
fn planning_is_deterministic() {
    let spec = SampleSpec::new(9);
    assert_eq!(sample_timestamps(123.4, &spec), sample_timestamps(123.4, &spec));
}

#[test]
fn single_candidate_is_the_interval_midpoint() {
    let timestamps = sample_timestamps(10.0, &no_margins(1));
    assert_eq!(timestamps, vec![5.0]);
}

#[test]
fn short_video_collapses_to_midpoint() {
    // Default margins (0.5 s each) leave nothing of 0.8 s.
    assert_eq!(sample_timestamps(0.8, &SampleSpec::default()), vec![0.4]);
}

#[test]
fn zero_and_bogus_durations_sample_the_first_frame() {
    assert_eq!(sample_timestamps(0.0, &SampleSpec::default()), vec![0.0]);
    assert_eq!(sample_timestamps(f64::NAN, &SampleSpec::default()), vec![0.0]);
    assert_eq!(sample_timestamps(-3.0, &SampleSpec::default()), vec![0.0]);
}

#[test]
fn count_is_clamped() {
    assert_eq!(SampleSpec::new(0).count, 1);
    assert_eq!(SampleSpec::new(10_000).count, MAX_SAMPLE_COUNT);
    assert_eq!(SampleSpec::default().with_count(7).count, 7);
}

#[test]
fn interval_reports_usable_span() {
    let spec = SampleSpec::new(4).with_margins(Margin::Fraction(0.1), Margin::Seconds(1.0));
    assert_eq!(spec.interval(20.0), Some((2.0, 19.0)));
    assert_eq!(spec.interval(0.0), None);
}

// ── Extraction ─────────────────────────────────────────────────────

#[test]
fn extracts_one_candidate_per_timestamp() {
    let backend = FakeBackend::new(10.0, 64, 36);
    let mut reader = backend.reader();

    let candidates = sample(&mut reader, &no_margins(5), &CancellationToken::new())
        .expect("Failed to sample");

    let timestamps: Vec<f64> = candidates.iter().map(|candidate| candidate.timestamp).collect();
    assert_eq!(timestamps, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    for candidate in &candidates {
        assert_eq!(candidate.image.dimensions(), (64, 36));
        assert_eq!(candidate.image.get_pixel(0, 0).0[0], red_for(candidate.timestamp));
        assert!(candidate.score.is_none());
    }
}

#[test]
fn failed_frames_are_dropped() {
    let backend = FakeBackend::new(10.0, 32, 32).failing_at(5.0);
    let mut reader = backend.reader();

    let candidates = sample(&mut reader, &no_margins(5), &CancellationToken::new())
        .expect("Failed to sample");

    let timestamps: Vec<f64> = candidates.iter().map(|candidate| candidate.timestamp).collect();
    assert_eq!(timestamps, vec![0.0, 2.5, 7.5, 10.0]);
    // Every planned timestamp was still attempted.
    assert_eq!(backend.extracted().len(), 5);
}

#[test]
fn nothing_extracted_is_an_error() {
    let mut backend = FakeBackend::new(10.0, 32, 32);
    backend.fail_all = true;
    let mut reader = backend.reader();

    let result = sample(&mut reader, &no_margins(5), &CancellationToken::new());
    assert!(matches!(
        result,
        Err(ThumbnailError::NoFramesExtracted { attempted: 5 })
    ));
}

#[test]
fn cancelled_before_start() {
    let backend = FakeBackend::new(10.0, 32, 32);
    let mut reader = backend.reader();
    let token = CancellationToken::new();
    token.cancel();

    let result = sample(&mut reader, &no_margins(5), &token);
    assert!(matches!(result, Err(ThumbnailError::Cancelled)));
    assert!(backend.extracted().is_empty());
}

// ── Progress ───────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    reports: Mutex<Vec<(Stage, u64, Option<u64>)>>,
}

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.reports
            .lock()
            .unwrap()
            .push((info.stage, info.current, info.total));
    }
}

#[test]
fn reports_every_attempt() {
    let backend = FakeBackend::new(10.0, 32, 32).failing_at(2.5);
    let mut reader = backend.reader();
    let recorder = Arc::new(Recorder::default());

    sample_with_progress(
        &mut reader,
        &no_margins(5),
        &CancellationToken::new(),
        recorder.clone(),
    )
    .expect("Failed to sample");

    let reports = recorder.reports.lock().unwrap();
    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|(stage, _, total)| *stage == Stage::Sampling && *total == Some(5)));
    assert_eq!(reports.last().map(|report| report.1), Some(5));
}
