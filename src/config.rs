use crate::phase_analysis::{PhaseConfig, DEFAULT_END_DIASTOLE_PERCENT, DEFAULT_END_SYSTOLE_PERCENT};
use clap::Parser;
use std::path::PathBuf;

fn parse_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("Invalid fraction: {}. Expected a number such as 0.35", s))?;
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!(
            "Invalid fraction: {}. Must be strictly between 0 and 1",
            s
        ))
    }
}

/// Extract end-diastolic and end-systolic frames from multi-frame echo DICOM files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing DICOM files (searched recursively)
    #[arg(help = "Directory containing DICOM files (searched recursively)")]
    pub input_dir: PathBuf,

    /// Output directory for results, defaults to <INPUT_DIR>/cardiac_phases
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Log per-file progress and skipped files
    #[arg(short, long)]
    pub verbose: bool,

    /// Fraction of the RR interval at which end-systole is placed
    #[arg(long, default_value_t = DEFAULT_END_SYSTOLE_PERCENT, value_parser = parse_fraction)]
    pub end_systole_percent: f64,

    /// Fraction of the RR interval at which end-diastole is placed
    #[arg(long, default_value_t = DEFAULT_END_DIASTOLE_PERCENT, value_parser = parse_fraction)]
    pub end_diastole_percent: f64,

    /// Number of per-file results echoed after the run
    #[arg(long, default_value = "3")]
    pub sample_count: usize,
}

impl Args {
    pub fn phase_config(&self) -> PhaseConfig {
        PhaseConfig::new(self.end_systole_percent, self.end_diastole_percent)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.input_dir.join("cardiac_phases"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["echo-phase", "/archive"]);
        assert_eq!(args.phase_config(), PhaseConfig::default());
        assert_eq!(args.output_dir(), PathBuf::from("/archive/cardiac_phases"));
        assert_eq!(args.sample_count, 3);
        assert!(!args.verbose);
    }

    #[test]
    fn percentages_are_validated() {
        let args = Args::parse_from([
            "echo-phase",
            "/archive",
            "--end-systole-percent",
            "0.3",
            "--output-dir",
            "/tmp/out",
        ]);
        assert_eq!(args.phase_config().end_systole_percent, 0.3);
        assert_eq!(args.output_dir(), PathBuf::from("/tmp/out"));

        let err = Args::try_parse_from(["echo-phase", "/archive", "--end-diastole-percent", "1.2"]);
        assert!(err.is_err());
        assert!(parse_fraction("abc").is_err());
    }
}
