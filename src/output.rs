use crate::extraction::{ExtractionStats, FileReport};
use crate::frame_labels::LabelMap;
use crate::phase_analysis::{CardiacPhaseResult, ES0_LABEL};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// `"ES0: 6, ED1: 86, ES1: 38, ..."`: ES0 first, then ED before ES for each
/// cycle in ascending cycle number.
pub fn format_frames_string(labeled_frames: &LabelMap) -> String {
    let mut pairs = Vec::new();

    if let Some(frame) = labeled_frames.get(ES0_LABEL) {
        pairs.push(format!("{}: {}", ES0_LABEL, frame));
    }

    let mut by_cycle: BTreeMap<usize, (Option<i64>, Option<i64>)> = BTreeMap::new();
    for (label, &frame) in labeled_frames.iter() {
        if label == ES0_LABEL {
            continue;
        }
        let (is_ed, number) = match (label.strip_prefix("ED"), label.strip_prefix("ES")) {
            (Some(number), _) => (true, number),
            (_, Some(number)) => (false, number),
            _ => continue,
        };
        let Ok(cycle) = number.parse::<usize>() else {
            continue;
        };
        let entry = by_cycle.entry(cycle).or_default();
        if is_ed {
            entry.0 = Some(frame);
        } else {
            entry.1 = Some(frame);
        }
    }

    for (cycle, (ed, es)) in by_cycle {
        if let Some(frame) = ed {
            pairs.push(format!("ED{}: {}", cycle, frame));
        }
        if let Some(frame) = es {
            pairs.push(format!("ES{}: {}", cycle, frame));
        }
    }

    pairs.join(", ")
}

/// `"ES0:6, R1:10, ES1:38, ..."` in chronological order.
pub fn format_sequential(sequential_order: &[(i64, String)]) -> String {
    sequential_order
        .iter()
        .map(|(frame, label)| format!("{}:{}", label, frame))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Short human-readable description of one phase result.
pub fn phase_summary_text(result: &CardiacPhaseResult) -> String {
    let mut text = String::new();
    let timing = &result.timing;

    let _ = writeln!(text, "Cardiac Phase Detection Summary");
    let _ = writeln!(text, "{}", "=".repeat(50));
    let _ = writeln!(text, "Total Frames: {}", timing.num_frames);
    let _ = writeln!(text, "Frame Time: {:.2} ms", timing.frame_time_ms);
    let _ = writeln!(text, "Cardiac Cycles: {}", result.cycles.len());
    if let Some(hr) = result.heart_rate_bpm() {
        let _ = writeln!(text, "Heart Rate: {:.1} BPM", hr);
    }

    let _ = writeln!(text, "\nKey Frames:");
    let _ = writeln!(text, "  End-Systolic: {:?}", result.end_systolic_frames);
    let _ = writeln!(text, "  End-Diastolic: {:?}", result.end_diastolic_frames);

    if !result.labeled_frames.is_empty() {
        let items: Vec<String> = result
            .labeled_frames
            .iter()
            .map(|(label, frame)| format!("{}:{}", label, frame))
            .collect();
        let _ = writeln!(text, "\nLabeled Frames: {}", items.join(", "));
    }
    text
}

pub const DETAILED_JSON: &str = "cardiac_phases_detailed.json";
pub const SUMMARY_CSV: &str = "cardiac_phases.csv";
pub const SUMMARY_TEXT: &str = "cardiac_phases.txt";
pub const FRAME_MAPPING: &str = "frame_mapping.txt";
pub const ACCESS_FORMATS: &str = "multiple_access_formats.txt";
pub const STATS_JSON: &str = "extraction_stats.json";

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Reports keyed by relative path, in result order.
struct ReportsByPath<'a>(&'a [FileReport]);

impl Serialize for ReportsByPath<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for report in self.0 {
            map.serialize_entry(&report.relative_path, report)?;
        }
        map.end()
    }
}

pub fn write_detailed_json(path: &Path, results: &[FileReport]) -> Result<()> {
    let mut writer = create(path)?;
    serde_json::to_writer_pretty(&mut writer, &ReportsByPath(results))?;
    writer.flush()?;
    Ok(())
}

pub fn write_summary_csv(path: &Path, results: &[FileReport]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create(path)?);
    writer.write_record(["File Path", "Cardiac Cycles", "Cardiac Phase Frames"])?;
    for result in results {
        let cycles = result.summary.total_cycles.to_string();
        writer.write_record([
            result.relative_path.as_str(),
            cycles.as_str(),
            result.formatted_string.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary_text(path: &Path, results: &[FileReport]) -> Result<()> {
    let mut writer = create(path)?;
    writeln!(writer, "CARDIAC PHASE FRAMES EXTRACTION RESULTS")?;
    writeln!(writer, "{}\n", "=".repeat(50))?;
    for result in results {
        writeln!(writer, "File: {}", result.relative_path)?;
        writeln!(writer, "Cycles: {}", result.summary.total_cycles)?;
        writeln!(writer, "Frames: {}", result.formatted_string)?;
        writeln!(writer, "{}", "-".repeat(30))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_frame_mapping(path: &Path, results: &[FileReport]) -> Result<()> {
    let mut writer = create(path)?;
    for result in results {
        writeln!(writer, "{}: {}", result.relative_path, result.formatted_string)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_access_formats(path: &Path, results: &[FileReport]) -> Result<()> {
    let mut writer = create(path)?;
    writeln!(writer, "MULTIPLE ACCESS FORMATS FOR CARDIAC PHASE FRAMES")?;
    writeln!(writer, "{}\n", "=".repeat(60))?;
    for result in results {
        writeln!(writer, "File: {}", result.relative_path)?;
        writeln!(writer, "{}", "-".repeat(40))?;
        writeln!(
            writer,
            "Simple Dictionary: {}",
            serde_json::to_string(&result.simple_dictionary)?
        )?;
        writeln!(writer, "By Cycle: {}", serde_json::to_string(&result.by_cycle)?)?;
        writeln!(writer, "By Phase: {}", serde_json::to_string(&result.by_phase)?)?;
        writeln!(
            writer,
            "Sequential Order: {}\n",
            format_sequential(&result.sequential_order)
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    #[serde(flatten)]
    stats: &'a ExtractionStats,
    average_cycles_per_file: Option<f64>,
    success_rate_percent: Option<f64>,
    generated_at: DateTime<Utc>,
}

pub fn write_stats_json(path: &Path, stats: &ExtractionStats) -> Result<()> {
    let report = StatsReport {
        stats,
        average_cycles_per_file: stats.average_cycles_per_file(),
        success_rate_percent: stats.success_rate(),
        generated_at: Utc::now(),
    };
    let mut writer = create(path)?;
    serde_json::to_writer_pretty(&mut writer, &report)?;
    writer.flush()?;
    Ok(())
}

/// Write every report file into `output_dir`. Returns the files written, or
/// nothing when there are no results.
pub fn write_reports(
    output_dir: &Path,
    results: &[FileReport],
    stats: &ExtractionStats,
) -> Result<Vec<PathBuf>> {
    if results.is_empty() {
        warn!("No results to save");
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    info!("Saving results to {}", output_dir.display());

    let written = vec![
        output_dir.join(DETAILED_JSON),
        output_dir.join(SUMMARY_CSV),
        output_dir.join(SUMMARY_TEXT),
        output_dir.join(FRAME_MAPPING),
        output_dir.join(ACCESS_FORMATS),
        output_dir.join(STATS_JSON),
    ];
    write_detailed_json(&written[0], results)?;
    write_summary_csv(&written[1], results)?;
    write_summary_text(&written[2], results)?;
    write_frame_mapping(&written[3], results)?;
    write_access_formats(&written[4], results)?;
    write_stats_json(&written[5], stats)?;

    Ok(written)
}
