pub mod config;
pub mod data_loading;
pub mod extraction;
pub mod frame_labels;
pub mod output;
pub mod phase_analysis;
pub mod timing;

pub use extraction::{ExtractionError, ExtractionStats, FileReport, PhaseExtractor};
pub use frame_labels::{key_frames, summarize, FrameSummary, KeyFrames, LabelMap};
pub use phase_analysis::{
    compute, CardiacCycle, CardiacPhaseDetector, CardiacPhaseResult, PhaseConfig,
};
pub use timing::{
    extract_timing, MissingRequiredTagError, TagMap, TagSource, TagValue, TimingInfo, TimingTag,
};
