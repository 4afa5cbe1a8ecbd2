//! Class tables for detection labels.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// The 80 COCO classes in YOLO order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Maps class ids to human-readable names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassTable {
    names: Vec<String>,
}

impl ClassTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn coco() -> Self {
        Self::new(COCO_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    /// One name per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        let names: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(anyhow!("labels file {} has no entries", path.display()));
        }
        Ok(Self::new(names))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for `class_id`, or the decimal id when unmapped.
    pub fn label(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::coco()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unmapped_ids_fall_back_to_number() {
        let table = ClassTable::coco();
        assert_eq!(table.label(0), "person");
        assert_eq!(table.label(79), "toothbrush");
        assert_eq!(table.label(80), "80");
    }

    #[test]
    fn labels_file_skips_comments() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "# custom model")?;
        writeln!(file, "forklift")?;
        writeln!(file)?;
        writeln!(file, "pallet")?;
        let table = ClassTable::from_file(file.path())?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.label(1), "pallet");
        Ok(())
    }

    #[test]
    fn empty_labels_file_is_rejected() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(ClassTable::from_file(file.path()).is_err());
        Ok(())
    }
}
