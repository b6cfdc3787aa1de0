use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use echo_phase::output::{self, DETAILED_JSON, FRAME_MAPPING, STATS_JSON, SUMMARY_CSV};
use echo_phase::{PhaseConfig, PhaseExtractor, TimingTag};
use std::fs;
use std::path::Path;

const US_MULTIFRAME_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.3.1";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

fn tag(timing_tag: TimingTag) -> Tag {
    let (group, element) = timing_tag.tag();
    Tag(group, element)
}

fn write_dicom(path: &Path, elements: Vec<InMemElement>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    InMemDicomObject::from_element_iter(elements)
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LE)
                .media_storage_sop_class_uid(US_MULTIFRAME_STORAGE)
                .media_storage_sop_instance_uid("2.25.314159"),
        )
        .unwrap()
        .write_to_file(path)
        .unwrap();
}

fn cine_loop(r_waves: &[f64], frame_time: &str, frames: &str) -> Vec<InMemElement> {
    vec![
        DataElement::new(tag(TimingTag::CineRate), VR::IS, PrimitiveValue::from("30")),
        DataElement::new(tag(TimingTag::FrameTime), VR::DS, PrimitiveValue::from(frame_time)),
        DataElement::new(tag(TimingTag::NumberOfFrames), VR::IS, PrimitiveValue::from(frames)),
        DataElement::new(
            tag(TimingTag::RWaveTimeVector),
            VR::FD,
            PrimitiveValue::F64(r_waves.iter().copied().collect()),
        ),
    ]
}

fn build_archive(root: &Path) {
    write_dicom(&root.join("valid1.dcm"), cine_loop(&[100.0, 900.0, 1700.0], "10", "200"));
    write_dicom(&root.join("study/valid2.dcm"), cine_loop(&[200.0, 1000.0], "20", "100"));
    write_dicom(&root.join("single.dcm"), cine_loop(&[100.0, 900.0], "10", "1"));
    write_dicom(&root.join("empty.dcm"), cine_loop(&[], "10", "40"));

    let mut missing_frame_time = cine_loop(&[100.0, 900.0], "10", "60");
    missing_frame_time.retain(|e| e.header().tag != tag(TimingTag::FrameTime));
    write_dicom(&root.join("missing_ft.dcm"), missing_frame_time);

    fs::write(root.join("README"), b"not a dicom file").unwrap();
    fs::write(root.join("notes.txt"), b"ignored").unwrap();
}

#[test]
fn batch_run_counts_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    build_archive(dir.path());

    let mut extractor = PhaseExtractor::new(dir.path(), PhaseConfig::default());
    extractor.process_all_files().unwrap();

    let stats = *extractor.stats();
    assert_eq!(stats.total_files, 6);
    assert_eq!(stats.multiframe_files, 4);
    assert_eq!(stats.successful_extractions, 2);
    assert_eq!(stats.failed_extractions, 2);
    assert_eq!(stats.total_cycles_detected, 3);

    let paths: Vec<&str> = extractor
        .results()
        .iter()
        .map(|r| r.relative_path.as_str())
        .collect();
    assert_eq!(paths, ["study/valid2.dcm", "valid1.dcm"]);
    assert_eq!(
        extractor.results()[0].formatted_string,
        "ES0: 6, ED1: 48, ES1: 24"
    );
    assert_eq!(
        extractor.results()[1].formatted_string,
        "ES0: 6, ED1: 86, ES1: 38, ED2: 166, ES2: 118"
    );

    let failed: Vec<&str> = extractor
        .failures()
        .iter()
        .map(|f| f.relative_path.as_str())
        .collect();
    assert_eq!(failed, ["empty.dcm", "missing_ft.dcm"]);

    let out = dir.path().join("cardiac_phases");
    let written = output::write_reports(&out, extractor.results(), extractor.stats()).unwrap();
    assert_eq!(written.len(), 6);
    assert!(written.iter().all(|p| p.is_file()));

    let csv = fs::read_to_string(out.join(SUMMARY_CSV)).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("File Path,Cardiac Cycles,Cardiac Phase Frames")
    );
    assert_eq!(
        lines.next(),
        Some("study/valid2.dcm,1,\"ES0: 6, ED1: 48, ES1: 24\"")
    );

    let mapping = fs::read_to_string(out.join(FRAME_MAPPING)).unwrap();
    assert!(mapping.contains("valid1.dcm: ES0: 6, ED1: 86, ES1: 38, ED2: 166, ES2: 118"));

    let detailed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(DETAILED_JSON)).unwrap()).unwrap();
    let valid1 = &detailed["valid1.dcm"];
    assert_eq!(valid1["simple_dictionary"]["ED1"], 86);
    assert_eq!(valid1["by_cycle"]["Cycle_0"]["ES"], 6);
    assert_eq!(valid1["by_phase"]["r_waves"]["R2"], 90);
    assert_eq!(valid1["sequential_order"][0][1], "ES0");
    assert_eq!(valid1["summary"]["total_frames"], 200);

    let stats_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(STATS_JSON)).unwrap()).unwrap();
    assert_eq!(stats_json["successful_extractions"], 2);
    assert_eq!(stats_json["success_rate_percent"], 50.0);
    assert!(stats_json["generated_at"].is_string());
}

#[test]
fn nothing_is_written_without_results() {
    let dir = tempfile::tempdir().unwrap();
    write_dicom(&dir.path().join("single.dcm"), cine_loop(&[100.0], "10", "1"));

    let mut extractor = PhaseExtractor::new(dir.path(), PhaseConfig::default());
    extractor.process_all_files().unwrap();
    assert_eq!(extractor.stats().multiframe_files, 0);

    let out = dir.path().join("cardiac_phases");
    let written = output::write_reports(&out, extractor.results(), extractor.stats()).unwrap();
    assert!(written.is_empty());
    assert!(!out.exists());
}

#[test]
fn extract_file_rejects_single_frame_loops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.dcm");
    write_dicom(&path, cine_loop(&[100.0, 900.0], "10", "1"));

    let extractor = PhaseExtractor::new(dir.path(), PhaseConfig::default());
    let err = extractor.extract_file(&path).unwrap_err();
    assert!(matches!(
        err,
        echo_phase::ExtractionError::NotMultiFrame { frames: 1 }
    ));
}
