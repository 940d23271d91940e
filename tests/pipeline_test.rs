//! End-to-end tests of the detection pipeline on synthetic scan data.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use flaremon::config::{DetectorConfig, OpenFlarePolicy};
use flaremon::core::{feed_detector, Detector, DualPipeline};
use flaremon::report::{render_flare_list, write_flare_list, TriggerView};
use flaremon::source::{Sample, ScanFile, ScanLine, CHANNELS, HEADER_LINES};

const BASE: [f64; CHANNELS] = [10_000.0, 4_000.0, 1_000.0];
const NOISE: f64 = 10.0;

/// Quiet samples ahead of every event; past warm-up and scan-start suppression.
const LEAD_IN: usize = 200;

fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 14)
        .unwrap()
        .and_hms_opt(18, 0, 0)
        .unwrap()
}

/// Builder for a one-second-cadence reading series.
#[derive(Default)]
struct Series {
    readings: Vec<[f64; CHANNELS]>,
}

impl Series {
    fn new() -> Self {
        Self::default()
    }

    fn quiet_reading(&self) -> [f64; CHANNELS] {
        let wobble = if self.readings.len() % 2 == 0 {
            NOISE
        } else {
            -NOISE
        };
        BASE.map(|b| b + wobble)
    }

    fn quiet(mut self, n: usize) -> Self {
        for _ in 0..n {
            let reading = self.quiet_reading();
            self.readings.push(reading);
        }
        self
    }

    /// Triangular burst peaking at `len / 2`.
    fn burst(mut self, len: usize) -> Self {
        for k in 0..len {
            let amplitude = 1_000.0 + 500.0 * k.min(len - k) as f64;
            let reading = self.quiet_reading().map(|v| v + amplitude);
            self.readings.push(reading);
        }
        self
    }

    /// Constant offset, as produced by a receiver gain change.
    fn step(mut self, n: usize, offset: f64) -> Self {
        for _ in 0..n {
            let reading = self.quiet_reading().map(|v| v + offset);
            self.readings.push(reading);
        }
        self
    }

    fn set(mut self, index: usize, reading: [f64; CHANNELS]) -> Self {
        self.readings[index] = reading;
        self
    }

    fn time(index: usize) -> NaiveDateTime {
        start_time() + Duration::seconds(index as i64)
    }

    fn samples(&self) -> Vec<Sample> {
        self.readings
            .iter()
            .enumerate()
            .map(|(i, &r)| Sample::new(Self::time(i), r))
            .collect()
    }

    fn lines(&self) -> Vec<ScanLine> {
        self.readings
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let text = format!(
                    "{} 0 {:.1} {:.1} {:.1}",
                    Self::time(i).format("%Y%m%d %H%M%S"),
                    r[0],
                    r[1],
                    r[2]
                );
                ScanLine::new(i + 1, text)
            })
            .collect()
    }
}

fn run(series: &Series, config: DetectorConfig) -> Detector {
    let mut detector = Detector::new(config);
    for (i, sample) in series.samples().iter().enumerate() {
        detector.process(sample, i + 1).unwrap();
    }
    detector.refresh().unwrap();
    detector
}

#[test]
fn test_true_flare_is_detected_and_graded() {
    let config = DetectorConfig::default();
    let series = Series::new().quiet(LEAD_IN).burst(120).quiet(60);
    let detector = run(&series, config);

    let flares = &detector.record().flares;
    assert_eq!(flares.len(), 1);

    let flare = &flares[0];
    // Flags start once the confidence counter is saturated
    assert_eq!(flare.start, Series::time(LEAD_IN + config.nflare - 1));
    assert_eq!(flare.peak, Series::time(LEAD_IN + 60));
    assert_eq!(flare.end, Some(Series::time(LEAD_IN + 120)));
    assert!(!flare.is_in_progress());
    assert!(flare.severities().iter().all(|&s| s > 0));

    assert!(detector
        .record()
        .confidence
        .iter()
        .all(|&c| c <= config.nflare));
}

#[test]
fn test_level_change_is_rejected_and_background_rebased() {
    let config = DetectorConfig::default();
    let mut detector = Detector::new(config);
    let series = Series::new().quiet(LEAD_IN).step(150, 300.0);
    let samples = series.samples();

    for (i, sample) in samples.iter().enumerate().take(LEAD_IN + 20) {
        detector.process(sample, i + 1).unwrap();
    }
    // Provisionally flagged while the episode awaits its check
    assert!(detector.flags().iter().any(|&f| f > 0));

    for (i, sample) in samples.iter().enumerate().skip(LEAD_IN + 20) {
        detector.process(sample, i + 1).unwrap();
    }
    detector.refresh().unwrap();

    assert!(detector.flags().iter().all(|&f| f == 0));
    assert!(detector.record().flares.is_empty());
    let stats = detector.background().stats();
    for ch in 0..CHANNELS {
        assert!((stats.mean[ch] - (BASE[ch] + 300.0)).abs() < 1e-6);
    }
    assert_eq!(detector.confidence(), 0);
}

#[test]
fn test_short_burst_is_debounced() {
    let config = DetectorConfig::default();
    let series = Series::new()
        .quiet(LEAD_IN)
        .burst(config.nflare - 1)
        .quiet(40);
    let detector = run(&series, config);

    assert!(detector.flags().iter().all(|&f| f == 0));
    assert!(detector.record().flares.is_empty());

    let confidence = &detector.record().confidence;
    assert_eq!(*confidence.iter().max().unwrap(), config.nflare - 1);
    assert!(confidence
        .windows(2)
        .all(|w| w[0].abs_diff(w[1]) <= 1));
}

#[test]
fn test_single_sample_gap_is_closed() {
    let config = DetectorConfig::default();
    let dip = LEAD_IN + 80;
    let series = Series::new().quiet(LEAD_IN).burst(140).quiet(60);
    let quiet = BASE.map(|b| b + NOISE);
    let series = series.set(dip, quiet);
    let detector = run(&series, config);

    assert_eq!(detector.flags()[dip], 0);
    let flares = &detector.record().flares;
    assert_eq!(flares.len(), 1);
    assert_eq!(flares[0].start, Series::time(LEAD_IN + config.nflare - 1));
    assert_eq!(flares[0].end, Some(Series::time(LEAD_IN + 140)));
}

#[test]
fn test_missing_sample_inside_flare_carries_flag() {
    let config = DetectorConfig::default();
    let gap = LEAD_IN + 70;
    let series = Series::new()
        .quiet(LEAD_IN)
        .burst(120)
        .quiet(60)
        .set(gap, [0.0; CHANNELS]);
    let detector = run(&series, config);

    let flags = detector.flags();
    assert!(flags[gap - 1] > 0);
    assert_eq!(flags[gap], flags[gap - 1]);
    assert!(detector.record().derived[gap].is_none());
    assert_eq!(detector.record().flares.len(), 1);
}

#[test]
fn test_non_finite_reading_does_not_hide_flare() {
    let config = DetectorConfig::default();
    let series = Series::new().quiet(LEAD_IN + 10).burst(120).quiet(170);
    let mut lines = series.lines();
    let corrupt = LEAD_IN + 5;
    lines[corrupt].text = format!(
        "{} 0 nan 4010.0 1010.0",
        Series::time(corrupt).format("%Y%m%d %H%M%S")
    );

    let mut detector = Detector::new(config);
    let summary = feed_detector(&mut detector, &lines).unwrap();

    assert_eq!(summary.malformed, 1);
    let stats = detector.background().stats();
    assert!(stats.mean.iter().chain(stats.std.iter()).all(|v| v.is_finite()));
    let flares = &detector.record().flares;
    assert_eq!(flares.len(), 1);
    assert!(flares[0].severities().iter().all(|&s| s > 0));
}

#[test]
fn test_warm_up_never_flags() {
    let config = DetectorConfig::default();
    // A flare-sized burst while the background is still filling
    let series = Series::new().burst(config.nbgnd).quiet(LEAD_IN);
    let detector = run(&series, config);

    assert!(detector.record().confidence[..config.nbgnd]
        .iter()
        .all(|&c| c == 0));
    assert!(detector.flags()[..config.nbgnd].iter().all(|&f| f == 0));
}

#[test]
fn test_dual_pipeline_matches_sequential_runs() {
    let fast_config = DetectorConfig::new(2.5, 10, 50);
    let slow_config = DetectorConfig::new(2.5, 10, 200);
    let series = Series::new()
        .quiet(260)
        .burst(120)
        .quiet(100)
        .step(120, 300.0)
        .quiet(50);
    let lines = series.lines();

    let mut pipeline = DualPipeline::new(fast_config, slow_config);
    pipeline.feed(&lines).unwrap();

    let mut fast = Detector::new(fast_config);
    let mut slow = Detector::new(slow_config);
    feed_detector(&mut fast, &lines).unwrap();
    feed_detector(&mut slow, &lines).unwrap();

    assert_eq!(pipeline.fast.flags(), fast.flags());
    assert_eq!(pipeline.slow.flags(), slow.flags());
    assert_eq!(
        render_flare_list(&pipeline.fast.record().flares, OpenFlarePolicy::Finalize),
        render_flare_list(&fast.record().flares, OpenFlarePolicy::Finalize)
    );
    assert_eq!(
        render_flare_list(&pipeline.slow.record().flares, OpenFlarePolicy::Finalize),
        render_flare_list(&slow.record().flares, OpenFlarePolicy::Finalize)
    );
    assert_eq!(pipeline.fast.record().flares.len(), 1);
}

#[test]
fn test_split_batches_match_single_batch() {
    let config = DetectorConfig::default();
    let series = Series::new().quiet(LEAD_IN).burst(120).quiet(60);
    let lines = series.lines();

    let mut whole = Detector::new(config);
    feed_detector(&mut whole, &lines).unwrap();

    let mut split = Detector::new(config);
    for chunk in lines.chunks(37) {
        feed_detector(&mut split, chunk).unwrap();
    }

    assert_eq!(whole.flags(), split.flags());
    assert_eq!(
        render_flare_list(&whole.record().flares, OpenFlarePolicy::Finalize),
        render_flare_list(&split.record().flares, OpenFlarePolicy::Finalize)
    );
}

#[test]
fn test_open_flare_follows_policy() {
    let config = DetectorConfig::default();
    // Cut off in the middle of the burst
    let series = Series::new().quiet(LEAD_IN).burst(200);
    let mut detector = Detector::new(config);
    feed_detector(&mut detector, &series.lines()[..LEAD_IN + 90]).unwrap();

    let open = detector.record().open_flare().unwrap();
    assert_eq!(open.in_progress, Some(Series::time(LEAD_IN + 89)));

    let flares = &detector.record().flares;
    let finalized = render_flare_list(flares, OpenFlarePolicy::Finalize);
    let deferred = render_flare_list(flares, OpenFlarePolicy::Defer);
    assert_eq!(finalized.lines().count(), 2);
    assert_eq!(deferred.lines().count(), 1);
}

#[test]
fn test_scan_file_to_report_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let series = Series::new().quiet(LEAD_IN).burst(120).quiet(60);

    let mut content = String::from("FLARETEST\nProject: NormalObserving\n");
    for i in 3..=HEADER_LINES {
        content.push_str(&format!("header {i}\n"));
    }
    for line in series.lines() {
        content.push_str(&line.text);
        content.push('\n');
    }
    let scan_path = dir.path().join("TP20240514180000.dat");
    std::fs::write(&scan_path, content).unwrap();

    let scan = ScanFile::read(&scan_path).unwrap();
    assert!(scan.is_solar());
    assert_eq!(scan.lines.len(), series.readings.len());

    let day = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
    let out = dir.path().join("lists");
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let mut pipeline =
            DualPipeline::new(DetectorConfig::default(), DetectorConfig::new(2.5, 10, 200));
        pipeline.feed(&scan.lines).unwrap();
        let path = write_flare_list(
            &out,
            day,
            TriggerView::Fast,
            &pipeline.fast.record().flares,
            OpenFlarePolicy::Finalize,
        )
        .unwrap();
        outputs.push(std::fs::read_to_string(path).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
    let rows: Vec<&str> = outputs[0].lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].starts_with("20240514T180420"));
}

#[test]
fn test_non_solar_scan_is_recognized() {
    let mut content = String::from("FLARETEST\nProject: Calibration\n");
    for i in 3..=HEADER_LINES {
        content.push_str(&format!("header {i}\n"));
    }
    content.push_str("20240514 180000 0 1 2 3\n");
    let scan = ScanFile::from_text("TP20240514180000.dat", &content);
    assert!(!scan.is_solar());
    assert_eq!(scan.project.as_deref(), Some("Calibration"));
}
