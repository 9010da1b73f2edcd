use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Returned by [`ClassLabelRegistry::get`] for indices without a label.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Glyph and romanized name of every default class, in class-index order.
/// The last ten entries double as the digit alphabet.
const URDU_GLYPHS: [(&str, &str); 46] = [
    ("ا", "Alif"),
    ("ب", "Bay"),
    ("پ", "Pay"),
    ("ت", "Tay"),
    ("ٹ", "Ttay"),
    ("ث", "Say"),
    ("ج", "Jeem"),
    ("چ", "Chay"),
    ("ح", "Hay"),
    ("خ", "Khay"),
    ("د", "Daal"),
    ("ڈ", "Ddaal"),
    ("ذ", "Zaal"),
    ("ر", "Ray"),
    ("ڑ", "Rray"),
    ("ز", "Zay"),
    ("ژ", "Zhay"),
    ("س", "Seen"),
    ("ش", "Sheen"),
    ("ص", "Swad"),
    ("ض", "Dwad"),
    ("ط", "Tway"),
    ("ظ", "Zway"),
    ("ع", "Ain"),
    ("غ", "Ghain"),
    ("ف", "Fay"),
    ("ق", "Qaaf"),
    ("ک", "Kaaf"),
    ("گ", "Gaaf"),
    ("ل", "Laam"),
    ("م", "Meem"),
    ("ن", "Noon"),
    ("و", "Wao"),
    ("ہ", "Hay Gol"),
    ("ی", "Choti Yay"),
    ("ے", "Bari Yay"),
    ("۰", "Zero"),
    ("۱", "One"),
    ("۲", "Two"),
    ("۳", "Three"),
    ("۴", "Four"),
    ("۵", "Five"),
    ("۶", "Six"),
    ("۷", "Seven"),
    ("۸", "Eight"),
    ("۹", "Nine"),
];

const DIGIT_OFFSET: usize = 36;

/// The two independent classifiers served by this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    Character,
    Digit,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 2] = [ClassifierKind::Character, ClassifierKind::Digit];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::Character => "character",
            ClassifierKind::Digit => "digit",
        }
    }

    pub fn default_labels(&self) -> impl Iterator<Item = &'static str> {
        let glyphs = match self {
            ClassifierKind::Character => &URDU_GLYPHS[..],
            ClassifierKind::Digit => &URDU_GLYPHS[DIGIT_OFFSET..],
        };
        glyphs.iter().map(|(glyph, _)| *glyph)
    }

    /// Label reported by degraded responses when no model is loaded.
    pub fn placeholder_label(&self) -> &'static str {
        match self {
            ClassifierKind::Character => URDU_GLYPHS[0].0,
            ClassifierKind::Digit => URDU_GLYPHS[DIGIT_OFFSET].0,
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Romanized name of a known glyph ("ب" -> "Bay").
pub fn glyph_name(glyph: &str) -> Option<&'static str> {
    URDU_GLYPHS
        .iter()
        .find(|(g, _)| *g == glyph)
        .map(|(_, name)| *name)
}

#[derive(Error, Debug)]
pub enum LabelFileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label key '{0}' is not a non-negative integer")]
    InvalidKey(String),

    #[error("label index {0} appears more than once")]
    DuplicateIndex(usize),

    #[error("label indices are not contiguous: index {missing} is missing")]
    NotContiguous { missing: usize },

    #[error("label file is empty")]
    Empty,
}

/// Outcome of reading a label file. Only `Loaded` replaces the defaults.
#[derive(Debug)]
pub enum LabelLoad {
    Loaded(usize),
    NotFound,
    Malformed(LabelFileError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    Defaults,
    File(PathBuf),
}

/// On-disk shapes accepted for label files.
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    Map(BTreeMap<String, String>),
    List(Vec<String>),
}

/// Dense, zero-based index -> glyph mapping for one classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabelRegistry {
    kind: ClassifierKind,
    labels: Vec<String>,
    source: LabelSource,
}

impl ClassLabelRegistry {
    pub fn defaults(kind: ClassifierKind) -> Self {
        Self {
            kind,
            labels: kind.default_labels().map(str::to_string).collect(),
            source: LabelSource::Defaults,
        }
    }

    /// Replaces the labels with the contents of `path`.
    ///
    /// A missing or malformed file is not an error: the registry falls back
    /// to the built-in mapping for its kind and a warning is logged.
    pub fn load(&mut self, path: &Path) -> LabelLoad {
        tracing::info!(kind = %self.kind, path = %path.display(), "Loading class labels");

        match read_label_file(path) {
            Ok(Some(labels)) => {
                let count = labels.len();
                self.labels = labels;
                self.source = LabelSource::File(path.to_path_buf());
                tracing::info!(kind = %self.kind, count, "Loaded class labels");
                LabelLoad::Loaded(count)
            }
            Ok(None) => {
                tracing::warn!(
                    kind = %self.kind,
                    path = %path.display(),
                    "Class labels file not found, using default labels"
                );
                *self = Self::defaults(self.kind);
                LabelLoad::NotFound
            }
            Err(e) => {
                tracing::warn!(
                    kind = %self.kind,
                    path = %path.display(),
                    error = %e,
                    "Failed to load class labels, using default labels"
                );
                *self = Self::defaults(self.kind);
                LabelLoad::Malformed(e)
            }
        }
    }

    /// Label at `index`, or [`UNKNOWN_LABEL`].
    pub fn get(&self, index: usize) -> &str {
        self.labels
            .get(index)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.labels.len()
    }

    /// All labels by ascending index.
    pub fn all(&self) -> &[String] {
        &self.labels
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    pub fn source(&self) -> &LabelSource {
        &self.source
    }
}

/// `Ok(None)` when the file does not exist.
fn read_label_file(path: &Path) -> Result<Option<Vec<String>>, LabelFileError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let labels = match serde_json::from_str::<LabelFile>(&contents)? {
        LabelFile::List(labels) => labels,
        LabelFile::Map(entries) => dense_labels(entries)?,
    };

    if labels.is_empty() {
        return Err(LabelFileError::Empty);
    }

    Ok(Some(labels))
}

/// Normalizes string keys to integers and checks they cover `0..N`.
fn dense_labels(entries: BTreeMap<String, String>) -> Result<Vec<String>, LabelFileError> {
    let mut indexed = BTreeMap::new();
    for (key, label) in entries {
        let index: usize = key
            .trim()
            .parse()
            .map_err(|_| LabelFileError::InvalidKey(key.clone()))?;
        if indexed.insert(index, label).is_some() {
            return Err(LabelFileError::DuplicateIndex(index));
        }
    }

    indexed
        .into_iter()
        .enumerate()
        .map(|(expected, (index, label))| {
            if index == expected {
                Ok(label)
            } else {
                Err(LabelFileError::NotContiguous { missing: expected })
            }
        })
        .collect()
}
