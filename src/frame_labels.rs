//! Label views over a computed phase result.
//!
//! The same frames are exposed three ways: grouped by cycle, grouped by phase
//! type, and as one chronological list of events.

use crate::phase_analysis::{CardiacCycle, CardiacPhaseResult, Es0Estimate, ES0_LABEL};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Insertion-ordered map from label to value. Keys are unique; inserting an
/// existing label replaces its value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap<V = i64> {
    entries: Vec<(String, V)>,
}

impl<V> Default for LabelMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> LabelMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: V) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> Serialize for LabelMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, value) in &self.entries {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// Frames of one cycle. `Cycle_0` only carries ES0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleFrames {
    #[serde(rename = "R", skip_serializing_if = "Option::is_none")]
    pub r_wave: Option<i64>,
    #[serde(rename = "ED", skip_serializing_if = "Option::is_none")]
    pub end_diastole: Option<i64>,
    #[serde(rename = "ES")]
    pub end_systole: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseGroups {
    pub r_waves: LabelMap,
    pub end_diastoles: LabelMap,
    pub end_systoles: LabelMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameSummary {
    pub by_cycle: LabelMap<CycleFrames>,
    pub by_phase: PhaseGroups,
    /// `(frame, label)` pairs in ascending frame order.
    pub sequential_order: Vec<(i64, String)>,
    pub total_cycles: usize,
}

pub fn summarize(result: &CardiacPhaseResult) -> FrameSummary {
    build_summary(result.es0.as_ref(), &result.cycles)
}

pub(crate) fn build_summary(es0: Option<&Es0Estimate>, cycles: &[CardiacCycle]) -> FrameSummary {
    let mut summary = FrameSummary {
        total_cycles: cycles.len(),
        ..Default::default()
    };
    let mut events = Vec::with_capacity(1 + 3 * cycles.len());

    if let Some(es0) = es0 {
        summary.by_cycle.insert(
            "Cycle_0",
            CycleFrames {
                r_wave: None,
                end_diastole: None,
                end_systole: es0.frame,
            },
        );
        summary.by_phase.end_systoles.insert(ES0_LABEL, es0.frame);
        events.push((es0.frame, ES0_LABEL.to_string()));
    }

    for cycle in cycles {
        summary.by_cycle.insert(
            format!("Cycle_{}", cycle.cycle_number),
            CycleFrames {
                r_wave: Some(cycle.r_wave_frame),
                end_diastole: Some(cycle.end_diastole_frame),
                end_systole: cycle.end_systole_frame,
            },
        );

        let phases = &mut summary.by_phase;
        phases
            .r_waves
            .insert(cycle.r_wave_label(), cycle.r_wave_frame);
        phases
            .end_diastoles
            .insert(cycle.end_diastole_label(), cycle.end_diastole_frame);
        phases
            .end_systoles
            .insert(cycle.end_systole_label(), cycle.end_systole_frame);

        events.push((cycle.r_wave_frame, cycle.r_wave_label()));
        events.push((cycle.end_systole_frame, cycle.end_systole_label()));
        events.push((cycle.end_diastole_frame, cycle.end_diastole_label()));
    }

    // Stable: equal frames keep emission order.
    events.sort_by_key(|(frame, _)| *frame);
    summary.sequential_order = events;
    summary
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyFrameSummary {
    pub total_cycles: usize,
    pub frame_time_ms: f64,
    pub total_frames: usize,
}

/// Reduced view for callers that only need the frame arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFrames {
    pub end_systolic_frames: Vec<i64>,
    pub end_diastolic_frames: Vec<i64>,
    pub labeled_frames: LabelMap,
    pub summary: KeyFrameSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_end_diastolic: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_end_systole: Option<i64>,
}

pub fn key_frames(result: &CardiacPhaseResult) -> KeyFrames {
    KeyFrames {
        end_systolic_frames: result.end_systolic_frames.clone(),
        end_diastolic_frames: result.end_diastolic_frames.clone(),
        labeled_frames: result.labeled_frames.clone(),
        summary: KeyFrameSummary {
            total_cycles: result.cycles.len(),
            frame_time_ms: result.timing.frame_time_ms,
            total_frames: result.timing.num_frames,
        },
        first_end_diastolic: result.end_diastolic_frames.first().copied(),
        first_end_systole: result.end_systolic_frames.first().copied(),
    }
}
