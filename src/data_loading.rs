use crate::timing::{TagId, TagSource, TagValue, TimingTag};
use anyhow::{Context, Result};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, InMemDicomObject, OpenFileOptions};
use log::debug;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

impl TagSource for InMemDicomObject {
    fn lookup(&self, (group, element): TagId) -> Option<TagValue> {
        let elem = self.get(Tag(group, element))?;

        if let Ok(values) = elem.to_multi_float64() {
            return Some(match values.as_slice() {
                [single] => TagValue::Float(*single),
                _ => TagValue::from(values),
            });
        }

        // Keep the raw text so the extractor can tell "present but unusable"
        // apart from "absent".
        match elem.to_str() {
            Ok(text) => Some(TagValue::Text(text.into_owned())),
            Err(e) => {
                debug!("Tag ({:04X},{:04X}) has no readable value: {}", group, element, e);
                None
            }
        }
    }
}

/// Read a DICOM file up to, but not including, the pixel data.
pub fn open_header(path: &Path) -> Result<DefaultDicomObject> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .with_context(|| format!("Failed to open DICOM file: {}", path.display()))
}

/// Number of frames in the object, 1 when the attribute is missing or unusable.
pub fn number_of_frames(obj: &InMemDicomObject) -> usize {
    obj.lookup(TimingTag::NumberOfFrames.tag())
        .and_then(|v| v.to_f64())
        .filter(|v| v.is_finite() && *v >= 1.0)
        .map(|v| v as usize)
        .unwrap_or(1)
}

fn looks_like_dicom(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
        return false;
    };
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.eq_ignore_ascii_case("dcm"),
        None => true,
    }
}

/// Files under `dir` that look like DICOM: a `.dcm` extension (any case) or
/// a file name without any dot. Sorted by path.
pub fn find_dicom_candidates(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if looks_like_dicom(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::extract_timing;
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use std::fs;

    fn tag(timing_tag: TimingTag) -> Tag {
        let (group, element) = timing_tag.tag();
        Tag(group, element)
    }

    fn echo_object() -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(
                tag(TimingTag::RWaveTimeVector),
                VR::FD,
                PrimitiveValue::F64([100.0, 900.0, 1700.0].into_iter().collect()),
            ),
            DataElement::new(tag(TimingTag::FrameTime), VR::DS, PrimitiveValue::from("10.0")),
            DataElement::new(tag(TimingTag::NumberOfFrames), VR::IS, PrimitiveValue::from("200")),
            DataElement::new(tag(TimingTag::HeartRate), VR::IS, PrimitiveValue::from("75")),
        ])
    }

    #[test]
    fn dicom_object_feeds_the_extractor() {
        let timing = extract_timing(&echo_object()).unwrap();
        assert_eq!(timing.r_wave_times, vec![100.0, 900.0, 1700.0]);
        assert_eq!(timing.frame_time_ms, 10.0);
        assert_eq!(timing.num_frames, 200);
        assert_eq!(timing.heart_rate, Some(75.0));
        assert_eq!(timing.cine_rate, None);
    }

    #[test]
    fn absent_tags_are_none() {
        let obj = echo_object();
        assert_eq!(obj.lookup(TimingTag::CineRate.tag()), None);
        assert_eq!(number_of_frames(&obj), 200);
        assert_eq!(number_of_frames(&InMemDicomObject::new_empty()), 1);
    }

    #[test]
    fn non_numeric_text_is_kept_as_text() {
        let obj = InMemDicomObject::from_element_iter([DataElement::new(
            tag(TimingTag::FrameTime),
            VR::LO,
            PrimitiveValue::from("fast"),
        )]);
        assert!(matches!(
            obj.lookup(TimingTag::FrameTime.tag()),
            Some(TagValue::Text(_))
        ));
    }

    #[test]
    fn dotfiles_are_not_candidates() {
        assert!(!looks_like_dicom(Path::new("study/.DS_Store")));
        assert!(!looks_like_dicom(Path::new("series.v2")));
        assert!(looks_like_dicom(Path::new("study/IM0001")));
        assert!(looks_like_dicom(Path::new("loop.Dcm")));
        assert!(looks_like_dicom(Path::new(".dcm")));
    }

    #[test]
    fn candidates_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("study1");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("IM0002"), b"").unwrap();
        fs::write(dir.path().join("b.DCM"), b"").unwrap();
        fs::write(dir.path().join("a.dcm"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"").unwrap();
        fs::write(nested.join(".hidden"), b"").unwrap();

        let found = find_dicom_candidates(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            [
                PathBuf::from("a.dcm"),
                PathBuf::from("b.DCM"),
                PathBuf::from("study1/IM0002"),
            ]
        );
    }
}
