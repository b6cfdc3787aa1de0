use anyhow::Context;
use clap::Parser;
use echo_phase::config::Args;
use echo_phase::extraction::PhaseExtractor;
use echo_phase::output;
use env_logger::Env;
use log::debug;

fn print_summary(extractor: &PhaseExtractor) {
    let stats = extractor.stats();
    println!("\nCardiac Phase Extraction Summary:");
    println!("{}", "=".repeat(50));
    println!("Total DICOM files scanned: {}", stats.total_files);
    println!("Multi-frame files found: {}", stats.multiframe_files);
    println!("Successful extractions: {}", stats.successful_extractions);
    println!("Failed extractions: {}", stats.failed_extractions);
    println!("Total cardiac cycles detected: {}", stats.total_cycles_detected);

    if let Some(avg) = stats.average_cycles_per_file() {
        println!("Average cycles per file: {:.1}", avg);
    }
    if let Some(rate) = stats.success_rate() {
        println!("Success rate: {:.1}%", rate);
    }

    if !extractor.failures().is_empty() {
        println!("\nFailed files:");
        for failed in extractor.failures() {
            println!("  {}: {}", failed.relative_path, failed.reason);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let config = args.phase_config();
    config.validate()?;
    debug!("Using {:?}", config);

    let mut extractor = PhaseExtractor::new(&args.input_dir, config);
    extractor
        .process_all_files()
        .with_context(|| format!("Failed to process {}", args.input_dir.display()))?;

    let written = output::write_reports(&args.output_dir(), extractor.results(), extractor.stats())?;
    if !written.is_empty() {
        println!("Results saved:");
        for path in &written {
            println!("  {}", path.display());
        }
    }

    print_summary(&extractor);

    if !extractor.results().is_empty() && args.sample_count > 0 {
        println!("\nSample Results:");
        for result in extractor.results().iter().take(args.sample_count) {
            println!("  {}: {}", result.relative_path, result.formatted_string);
        }
    }

    Ok(())
}
