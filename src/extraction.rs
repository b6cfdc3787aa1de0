use crate::data_loading::{find_dicom_candidates, number_of_frames, open_header};
use crate::frame_labels::{key_frames, CycleFrames, KeyFrameSummary, LabelMap, PhaseGroups};
use crate::output::format_frames_string;
use crate::phase_analysis::{CardiacPhaseDetector, CardiacPhaseResult, PhaseConfig};
use crate::timing::{MissingRequiredTagError, TagSource};
use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a single file produced no phase report.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot read DICOM header: {0}")]
    Open(String),

    #[error("not a multi-frame file ({frames} frame(s))")]
    NotMultiFrame { frames: usize },

    #[error(transparent)]
    Timing(#[from] MissingRequiredTagError),

    #[error("no usable cardiac phases found")]
    NoPhases,
}

/// Per-file output of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    #[serde(skip)]
    pub file_path: PathBuf,
    #[serde(skip)]
    pub relative_path: String,
    pub simple_dictionary: LabelMap,
    pub by_cycle: LabelMap<CycleFrames>,
    pub by_phase: PhaseGroups,
    pub sequential_order: Vec<(i64, String)>,
    pub formatted_string: String,
    pub summary: KeyFrameSummary,
    pub end_systolic_frames: Vec<i64>,
    pub end_diastolic_frames: Vec<i64>,
}

impl FileReport {
    pub fn new(file_path: PathBuf, relative_path: String, result: CardiacPhaseResult) -> Self {
        let summary = key_frames(&result).summary;
        let formatted_string = format_frames_string(&result.labeled_frames);
        let frame_summary = result.frame_summary;

        Self {
            file_path,
            relative_path,
            simple_dictionary: result.labeled_frames,
            by_cycle: frame_summary.by_cycle,
            by_phase: frame_summary.by_phase,
            sequential_order: frame_summary.sequential_order,
            formatted_string,
            summary,
            end_systolic_frames: result.end_systolic_frames,
            end_diastolic_frames: result.end_diastolic_frames,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub relative_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub total_files: usize,
    pub multiframe_files: usize,
    pub successful_extractions: usize,
    pub failed_extractions: usize,
    pub total_cycles_detected: usize,
}

impl ExtractionStats {
    pub fn average_cycles_per_file(&self) -> Option<f64> {
        (self.successful_extractions > 0)
            .then(|| self.total_cycles_detected as f64 / self.successful_extractions as f64)
    }

    /// Share of multi-frame files that produced a report, in percent.
    pub fn success_rate(&self) -> Option<f64> {
        (self.multiframe_files > 0)
            .then(|| self.successful_extractions as f64 / self.multiframe_files as f64 * 100.0)
    }
}

/// Runs the phase pipeline over every multi-frame DICOM file below a directory.
pub struct PhaseExtractor {
    input_dir: PathBuf,
    detector: CardiacPhaseDetector,
    results: Vec<FileReport>,
    failures: Vec<FailedFile>,
    stats: ExtractionStats,
}

impl PhaseExtractor {
    pub fn new(input_dir: impl Into<PathBuf>, config: PhaseConfig) -> Self {
        Self {
            input_dir: input_dir.into(),
            detector: CardiacPhaseDetector::new(config),
            results: Vec::new(),
            failures: Vec::new(),
            stats: ExtractionStats::default(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn results(&self) -> &[FileReport] {
        &self.results
    }

    pub fn failures(&self) -> &[FailedFile] {
        &self.failures
    }

    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.input_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    /// Candidate files that open as DICOM and hold more than one frame.
    pub fn find_multiframe_dicoms(&mut self) -> Result<Vec<PathBuf>> {
        let candidates = find_dicom_candidates(&self.input_dir)?;
        self.stats.total_files = candidates.len();
        info!("Found {} potential DICOM files", candidates.len());

        let mut multiframe = Vec::new();
        for path in candidates {
            match open_header(&path) {
                Ok(obj) => {
                    let frames = number_of_frames(&obj);
                    if frames > 1 {
                        multiframe.push(path);
                    } else {
                        debug!("{}: single frame, skipped", path.display());
                    }
                }
                Err(e) => debug!("{}: {:#}", path.display(), e),
            }
        }

        self.stats.multiframe_files = multiframe.len();
        info!("Found {} multi-frame files", multiframe.len());
        Ok(multiframe)
    }

    /// Run the pipeline over an already loaded tag source.
    pub fn extract_from_source<S: TagSource + ?Sized>(
        &self,
        path: &Path,
        source: &S,
    ) -> Result<FileReport, ExtractionError> {
        let result = self.detector.process(source)?;
        if result.labeled_frames.is_empty() {
            return Err(ExtractionError::NoPhases);
        }
        Ok(FileReport::new(
            path.to_path_buf(),
            self.relative_path(path),
            result,
        ))
    }

    pub fn extract_file(&self, path: &Path) -> Result<FileReport, ExtractionError> {
        let obj = open_header(path).map_err(|e| ExtractionError::Open(format!("{:#}", e)))?;
        let frames = number_of_frames(&obj);
        if frames <= 1 {
            return Err(ExtractionError::NotMultiFrame { frames });
        }
        self.extract_from_source(path, &*obj)
    }

    /// Record the outcome of one file. Failures never stop the batch.
    pub fn record(&mut self, path: &Path, outcome: Result<FileReport, ExtractionError>) {
        match outcome {
            Ok(report) => {
                self.stats.successful_extractions += 1;
                self.stats.total_cycles_detected += report.summary.total_cycles;
                self.results.push(report);
            }
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                self.stats.failed_extractions += 1;
                self.failures.push(FailedFile {
                    relative_path: self.relative_path(path),
                    reason: e.to_string(),
                });
            }
        }
    }

    pub fn process_all_files(&mut self) -> Result<()> {
        let files = self.find_multiframe_dicoms()?;
        if files.is_empty() {
            warn!("No multi-frame files found in {}", self.input_dir.display());
            return Ok(());
        }

        info!("Extracting cardiac phases from {} files", files.len());
        for (i, path) in files.iter().enumerate() {
            debug!("[{}/{}] {}", i + 1, files.len(), path.display());
            let outcome = self.extract_file(path);
            self.record(path, outcome);
        }
        Ok(())
    }
}
