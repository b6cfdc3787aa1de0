use anyhow::Result;
use echo_phase::data_loading::open_header;
use echo_phase::output::phase_summary_text;
use echo_phase::phase_analysis::CardiacPhaseDetector;
use echo_phase::timing::{TagSource, TimingTag};
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <dicom_file>", args[0]);
        std::process::exit(1);
    }

    let obj = open_header(Path::new(&args[1]))?;

    println!("\nTiming tags:");
    for tag in TimingTag::REQUIRED.into_iter().chain(TimingTag::OPTIONAL) {
        match obj.lookup(tag.tag()) {
            Some(value) => println!("  {}: {:?}", tag, value),
            None => println!("  {}: --", tag),
        }
    }

    let result = CardiacPhaseDetector::default().process(&*obj)?;
    println!("\n{}", phase_summary_text(&result));

    Ok(())
}
