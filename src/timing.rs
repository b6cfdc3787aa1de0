use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// DICOM attribute tag as a (group, element) pair.
pub type TagId = (u16, u16);

/// The timing attributes read from an echo cine loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimingTag {
    RWaveTimeVector,
    FrameTime,
    NumberOfFrames,
    HeartRate,
    CineRate,
    EffectiveDuration,
    FrameDelay,
    ActualFrameDuration,
}

impl TimingTag {
    pub const REQUIRED: [TimingTag; 3] = [
        TimingTag::RWaveTimeVector,
        TimingTag::FrameTime,
        TimingTag::NumberOfFrames,
    ];

    pub const OPTIONAL: [TimingTag; 5] = [
        TimingTag::HeartRate,
        TimingTag::CineRate,
        TimingTag::EffectiveDuration,
        TimingTag::FrameDelay,
        TimingTag::ActualFrameDuration,
    ];

    pub const fn tag(self) -> TagId {
        match self {
            TimingTag::RWaveTimeVector => (0x0018, 0x6060),
            TimingTag::FrameTime => (0x0018, 0x1063),
            TimingTag::NumberOfFrames => (0x0028, 0x0008),
            TimingTag::HeartRate => (0x0018, 0x1088),
            TimingTag::CineRate => (0x0018, 0x0040),
            TimingTag::EffectiveDuration => (0x0018, 0x0072),
            TimingTag::FrameDelay => (0x0018, 0x1066),
            TimingTag::ActualFrameDuration => (0x0018, 0x1242),
        }
    }

    /// Standard DICOM keyword of the attribute.
    pub const fn keyword(self) -> &'static str {
        match self {
            TimingTag::RWaveTimeVector => "RWaveTimeVector",
            TimingTag::FrameTime => "FrameTime",
            TimingTag::NumberOfFrames => "NumberOfFrames",
            TimingTag::HeartRate => "HeartRate",
            TimingTag::CineRate => "CineRate",
            TimingTag::EffectiveDuration => "EffectiveDuration",
            TimingTag::FrameDelay => "FrameDelay",
            TimingTag::ActualFrameDuration => "ActualFrameDuration",
        }
    }

    /// Name of the `TimingInfo` field the attribute populates.
    pub const fn field(self) -> &'static str {
        match self {
            TimingTag::RWaveTimeVector => "r_wave_times",
            TimingTag::FrameTime => "frame_time_ms",
            TimingTag::NumberOfFrames => "num_frames",
            TimingTag::HeartRate => "heart_rate",
            TimingTag::CineRate => "cine_rate",
            TimingTag::EffectiveDuration => "effective_duration",
            TimingTag::FrameDelay => "frame_delay",
            TimingTag::ActualFrameDuration => "actual_frame_duration",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::REQUIRED
            .into_iter()
            .chain(Self::OPTIONAL)
            .find(|t| t.keyword() == keyword)
    }
}

impl fmt::Display for TimingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (group, element) = self.tag();
        write!(f, "({:04X},{:04X}) {}", group, element, self.keyword())
    }
}

/// A typed value as handed out by a tag source.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<TagValue>),
}

impl TagValue {
    /// Coerce a scalar value to `f64`. Decimal strings are parsed, a list
    /// holding exactly one element is treated as that element.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            TagValue::Int(v) => Some(*v as f64),
            TagValue::Float(v) => Some(*v),
            TagValue::Text(s) => {
                let s = s.trim_matches(|c: char| c.is_whitespace() || c == '\0');
                if s.contains('\\') {
                    return None;
                }
                s.parse().ok()
            }
            TagValue::List(items) if items.len() == 1 => items[0].to_f64(),
            TagValue::List(_) => None,
        }
    }

    /// Coerce a value to a list of `f64`, element-wise. A scalar becomes a
    /// one-element list and a backslash separated multi-value string is split.
    pub fn to_f64_list(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Int(_) | TagValue::Float(_) => self.to_f64().map(|v| vec![v]),
            TagValue::Text(s) => {
                let s = s.trim_matches(|c: char| c.is_whitespace() || c == '\0');
                if s.is_empty() {
                    return Some(Vec::new());
                }
                s.split('\\').map(|part| part.trim().parse().ok()).collect()
            }
            TagValue::List(items) => items.iter().map(TagValue::to_f64).collect(),
        }
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

impl From<Vec<f64>> for TagValue {
    fn from(v: Vec<f64>) -> Self {
        TagValue::List(v.into_iter().map(TagValue::Float).collect())
    }
}

/// Anything that can look up a DICOM attribute by tag.
pub trait TagSource {
    fn lookup(&self, tag: TagId) -> Option<TagValue>;

    fn lookup_keyword(&self, keyword: &str) -> Option<TagValue> {
        TimingTag::from_keyword(keyword).and_then(|t| self.lookup(t.tag()))
    }
}

/// In-memory tag source, handy for datasets assembled by hand.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    values: HashMap<TagId, TagValue>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: TimingTag, value: impl Into<TagValue>) -> Self {
        self.insert(tag.tag(), value);
        self
    }

    pub fn insert(&mut self, tag: TagId, value: impl Into<TagValue>) {
        self.values.insert(tag, value.into());
    }

    pub fn remove(&mut self, tag: TagId) -> Option<TagValue> {
        self.values.remove(&tag)
    }
}

impl TagSource for TagMap {
    fn lookup(&self, tag: TagId) -> Option<TagValue> {
        self.values.get(&tag).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissingReason {
    Absent,
    Unparseable,
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReason::Absent => write!(f, "not found in dataset"),
            MissingReason::Unparseable => write!(f, "present but not a usable value"),
        }
    }
}

/// A required timing tag is absent or could not be coerced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("required DICOM tag {tag} ({}) {reason}", .tag.field())]
pub struct MissingRequiredTagError {
    pub tag: TimingTag,
    pub reason: MissingReason,
}

impl MissingRequiredTagError {
    fn absent(tag: TimingTag) -> Self {
        Self {
            tag,
            reason: MissingReason::Absent,
        }
    }

    fn unparseable(tag: TimingTag) -> Self {
        Self {
            tag,
            reason: MissingReason::Unparseable,
        }
    }
}

/// Cardiac timing read from one multi-frame file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingInfo {
    /// R-wave times in milliseconds from the start of the recording.
    pub r_wave_times: Vec<f64>,
    pub frame_time_ms: f64,
    pub num_frames: usize,
    pub heart_rate: Option<f64>,
    pub cine_rate: Option<f64>,
    pub effective_duration: Option<f64>,
    pub frame_delay: Option<f64>,
    pub actual_frame_duration: Option<f64>,
}

impl TimingInfo {
    /// Timing with only the required fields set.
    pub fn new(r_wave_times: Vec<f64>, frame_time_ms: f64, num_frames: usize) -> Self {
        Self {
            r_wave_times,
            frame_time_ms,
            num_frames,
            heart_rate: None,
            cine_rate: None,
            effective_duration: None,
            frame_delay: None,
            actual_frame_duration: None,
        }
    }
}

fn required<S: TagSource + ?Sized>(
    source: &S,
    tag: TimingTag,
) -> Result<TagValue, MissingRequiredTagError> {
    source
        .lookup(tag.tag())
        .ok_or_else(|| MissingRequiredTagError::absent(tag))
}

fn optional<S: TagSource + ?Sized>(source: &S, tag: TimingTag) -> Option<f64> {
    let value = source.lookup(tag.tag())?;
    let coerced = value.to_f64();
    if coerced.is_none() {
        debug!("Ignoring optional tag {} with value {:?}", tag, value);
    }
    coerced
}

/// Pull the cardiac timing fields out of a tag source.
///
/// The three required tags must be present and coercible; optional tags that
/// are absent or malformed come back as `None`.
pub fn extract_timing<S: TagSource + ?Sized>(
    source: &S,
) -> Result<TimingInfo, MissingRequiredTagError> {
    let r_wave_times = required(source, TimingTag::RWaveTimeVector)?
        .to_f64_list()
        .ok_or_else(|| MissingRequiredTagError::unparseable(TimingTag::RWaveTimeVector))?;

    let frame_time_ms = required(source, TimingTag::FrameTime)?
        .to_f64()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| MissingRequiredTagError::unparseable(TimingTag::FrameTime))?;

    let num_frames = required(source, TimingTag::NumberOfFrames)?
        .to_f64()
        .filter(|v| v.is_finite() && *v >= 1.0)
        .ok_or_else(|| MissingRequiredTagError::unparseable(TimingTag::NumberOfFrames))?
        as usize;

    if r_wave_times.windows(2).any(|w| w[1] < w[0]) {
        warn!("R-wave time vector is not sorted: {:?}", r_wave_times);
    }

    Ok(TimingInfo {
        r_wave_times,
        frame_time_ms,
        num_frames,
        heart_rate: optional(source, TimingTag::HeartRate),
        cine_rate: optional(source, TimingTag::CineRate),
        effective_duration: optional(source, TimingTag::EffectiveDuration),
        frame_delay: optional(source, TimingTag::FrameDelay),
        actual_frame_duration: optional(source, TimingTag::ActualFrameDuration),
    })
}
