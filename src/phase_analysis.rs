use crate::frame_labels::{self, FrameSummary, LabelMap};
use crate::timing::{extract_timing, MissingRequiredTagError, TagSource, TimingInfo};
use log::{debug, trace};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_END_SYSTOLE_PERCENT: f64 = 0.35;
pub const DEFAULT_END_DIASTOLE_PERCENT: f64 = 0.95;

/// Where in the RR interval the phases are placed, as fractions of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseConfig {
    pub end_systole_percent: f64,
    pub end_diastole_percent: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            end_systole_percent: DEFAULT_END_SYSTOLE_PERCENT,
            end_diastole_percent: DEFAULT_END_DIASTOLE_PERCENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{name} must be strictly between 0 and 1, got {value}")]
pub struct PhaseConfigError {
    pub name: &'static str,
    pub value: f64,
}

impl PhaseConfig {
    pub fn new(end_systole_percent: f64, end_diastole_percent: f64) -> Self {
        Self {
            end_systole_percent,
            end_diastole_percent,
        }
    }

    pub fn validate(&self) -> Result<(), PhaseConfigError> {
        for (name, value) in [
            ("end_systole_percent", self.end_systole_percent),
            ("end_diastole_percent", self.end_diastole_percent),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(PhaseConfigError { name, value });
            }
        }
        Ok(())
    }
}

/// One heartbeat between two consecutive R-waves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardiacCycle {
    pub cycle_number: usize,
    pub r_wave_time_ms: f64,
    pub r_wave_frame: i64,
    pub end_diastole_time_ms: f64,
    pub end_diastole_frame: i64,
    pub end_systole_time_ms: f64,
    pub end_systole_frame: i64,
    pub cycle_duration_ms: f64,
    pub cycle_frames: i64,
}

impl CardiacCycle {
    pub fn r_wave_label(&self) -> String {
        format!("R{}", self.cycle_number)
    }

    pub fn end_diastole_label(&self) -> String {
        format!("ED{}", self.cycle_number)
    }

    pub fn end_systole_label(&self) -> String {
        format!("ES{}", self.cycle_number)
    }
}

/// End-systole estimated for the incomplete beat before the first R-wave.
///
/// This is an extrapolation: the missing beat is assumed to last as long as
/// the time elapsed before the first R-wave. It has no clinical grounding and
/// should not be read as a measured phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Es0Estimate {
    pub time_ms: f64,
    pub frame: i64,
}

pub const ES0_LABEL: &str = "ES0";

/// Everything derived from the timing of a single file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardiacPhaseResult {
    pub timing: TimingInfo,
    /// Unclamped frame of every R-wave.
    pub r_wave_frames: Vec<i64>,
    pub end_systolic_frames: Vec<i64>,
    pub end_diastolic_frames: Vec<i64>,
    pub end_systolic_times: Vec<f64>,
    pub end_diastolic_times: Vec<f64>,
    pub es0: Option<Es0Estimate>,
    pub cycles: Vec<CardiacCycle>,
    pub labeled_frames: LabelMap,
    pub rr_intervals: Vec<f64>,
    pub avg_rr_interval: Option<f64>,
    pub frame_summary: FrameSummary,
}

impl CardiacPhaseResult {
    /// Heart rate implied by the mean RR interval, in beats per minute.
    pub fn heart_rate_bpm(&self) -> Option<f64> {
        self.avg_rr_interval
            .filter(|rr| *rr > 0.0)
            .map(|rr| 60_000.0 / rr)
    }
}

fn time_to_frame(time_ms: f64, frame_time_ms: f64) -> i64 {
    (time_ms / frame_time_ms).floor() as i64
}

fn clamp_frame(frame: i64, num_frames: usize) -> i64 {
    let last = i64::try_from(num_frames)
        .unwrap_or(i64::MAX)
        .saturating_sub(1)
        .max(0);
    frame.min(last).max(0)
}

/// Place ED/ES frames inside every complete RR interval of `timing`.
///
/// Never fails: sparse timing just yields fewer cycles. A cycle whose ED or
/// ES time lands on or after the next R-wave is dropped as a whole.
pub fn compute(timing: TimingInfo, config: &PhaseConfig) -> CardiacPhaseResult {
    let frame_time_ms = timing.frame_time_ms;
    let num_frames = timing.num_frames;
    let r_wave_times = &timing.r_wave_times;

    let r_wave_frames: Vec<i64> = r_wave_times
        .iter()
        .map(|&t| time_to_frame(t, frame_time_ms))
        .collect();

    let rr_intervals: Vec<f64> = r_wave_times.windows(2).map(|w| w[1] - w[0]).collect();
    let avg_rr_interval = if rr_intervals.is_empty() {
        None
    } else {
        Some(rr_intervals.iter().sum::<f64>() / rr_intervals.len() as f64)
    };

    let mut end_systolic_frames = Vec::new();
    let mut end_systolic_times = Vec::new();
    let mut end_diastolic_frames = Vec::new();
    let mut end_diastolic_times = Vec::new();
    let mut labeled_frames = LabelMap::new();

    let es0 = match r_wave_times.first() {
        Some(&first) if first > 0.0 => {
            let time_ms = (first - first * config.end_systole_percent).max(0.0);
            let frame = clamp_frame(time_to_frame(time_ms, frame_time_ms), num_frames);
            end_systolic_frames.push(frame);
            end_systolic_times.push(time_ms);
            labeled_frames.insert(ES0_LABEL, frame);
            Some(Es0Estimate { time_ms, frame })
        }
        _ => None,
    };

    let mut cycles = Vec::new();
    for (i, pair) in r_wave_times.windows(2).enumerate() {
        let (r_wave_time, next_r_wave_time) = (pair[0], pair[1]);
        let cycle_duration = next_r_wave_time - r_wave_time;

        let end_diastole_time = r_wave_time + cycle_duration * config.end_diastole_percent;
        let end_systole_time = r_wave_time + cycle_duration * config.end_systole_percent;

        if !(end_diastole_time < next_r_wave_time && end_systole_time < next_r_wave_time) {
            debug!(
                "Dropping cycle {}: ED {:.1}ms / ES {:.1}ms not before next R-wave at {:.1}ms",
                i + 1,
                end_diastole_time,
                end_systole_time,
                next_r_wave_time
            );
            continue;
        }

        let cycle = CardiacCycle {
            cycle_number: i + 1,
            r_wave_time_ms: r_wave_time,
            r_wave_frame: r_wave_frames[i],
            end_diastole_time_ms: end_diastole_time,
            end_diastole_frame: clamp_frame(
                time_to_frame(end_diastole_time, frame_time_ms),
                num_frames,
            ),
            end_systole_time_ms: end_systole_time,
            end_systole_frame: clamp_frame(
                time_to_frame(end_systole_time, frame_time_ms),
                num_frames,
            ),
            cycle_duration_ms: cycle_duration,
            cycle_frames: time_to_frame(cycle_duration, frame_time_ms),
        };
        trace!("Accepted {:?}", cycle);

        end_systolic_frames.push(cycle.end_systole_frame);
        end_systolic_times.push(end_systole_time);
        end_diastolic_frames.push(cycle.end_diastole_frame);
        end_diastolic_times.push(end_diastole_time);

        labeled_frames.insert(cycle.end_diastole_label(), cycle.end_diastole_frame);
        labeled_frames.insert(cycle.end_systole_label(), cycle.end_systole_frame);
        labeled_frames.insert(cycle.r_wave_label(), cycle.r_wave_frame);

        cycles.push(cycle);
    }

    let frame_summary = frame_labels::build_summary(es0.as_ref(), &cycles);

    CardiacPhaseResult {
        timing,
        r_wave_frames,
        end_systolic_frames,
        end_diastolic_frames,
        end_systolic_times,
        end_diastolic_times,
        es0,
        cycles,
        labeled_frames,
        rr_intervals,
        avg_rr_interval,
        frame_summary,
    }
}

/// Phase detector with its percentages fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardiacPhaseDetector {
    config: PhaseConfig,
}

impl CardiacPhaseDetector {
    pub fn new(config: PhaseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    pub fn calculate(&self, timing: TimingInfo) -> CardiacPhaseResult {
        compute(timing, &self.config)
    }

    /// Extract the timing from `source` and compute its phases.
    pub fn process<S: TagSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<CardiacPhaseResult, MissingRequiredTagError> {
        let timing = extract_timing(source)?;
        Ok(self.calculate(timing))
    }
}
