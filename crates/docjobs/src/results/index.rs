//! Typed view over the flat file listing of one run namespace.
//!
//! Nothing here is persisted: the index is rebuilt from `list(namespace)`
//! whenever it is needed.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::StorageError;
use crate::storage::{join_key, ArtifactStore, StoredEntry};

static RE_TABLE_CSV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+-table-(\d+)\.csv$").unwrap());
static RE_TABLE_HTML: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+-table-(\d+)\.html$").unwrap());
static RE_TABLE_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+-table-image-(\d+)\.png$").unwrap());
static RE_PICTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+-picture-(\d+)\.png$").unwrap());
static RE_FULL_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.+_full_text_([a-z]+)_(force_(?:true|false))\.md$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Text,
    TableCsv,
    TableHtml,
    TableImage,
    PictureImage,
    /// Anything outside the naming convention.
    Other,
}

impl ArtifactKind {
    pub fn is_table(&self) -> bool {
        matches!(self, ArtifactKind::TableCsv | ArtifactKind::TableHtml)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ArtifactKind::TableImage | ArtifactKind::PictureImage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedArtifact {
    pub name: String,
    pub size: u64,
    pub kind: ArtifactKind,
    /// 1-based position for tables and images.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
    /// `(engine, force label)` for text artifacts.
    #[serde(skip)]
    text_variant: Option<(String, String)>,
}

/// Classifies one artifact file name.
pub fn classify(name: &str) -> (ArtifactKind, Option<u32>) {
    if let Some(n) = ordinal(&RE_TABLE_IMAGE, name) {
        (ArtifactKind::TableImage, Some(n))
    } else if let Some(n) = ordinal(&RE_PICTURE, name) {
        (ArtifactKind::PictureImage, Some(n))
    } else if let Some(n) = ordinal(&RE_TABLE_CSV, name) {
        (ArtifactKind::TableCsv, Some(n))
    } else if let Some(n) = ordinal(&RE_TABLE_HTML, name) {
        (ArtifactKind::TableHtml, Some(n))
    } else if RE_FULL_TEXT.is_match(name) {
        (ArtifactKind::Text, None)
    } else {
        (ArtifactKind::Other, None)
    }
}

fn ordinal(re: &Regex, name: &str) -> Option<u32> {
    re.captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

impl IndexedArtifact {
    fn from_entry(entry: StoredEntry) -> Self {
        let (kind, ordinal) = classify(&entry.name);
        let text_variant = if kind == ArtifactKind::Text {
            RE_FULL_TEXT
                .captures(&entry.name)
                .map(|c| (c[1].to_string(), c[2].to_string()))
        } else {
            None
        };
        Self {
            name: entry.name,
            size: entry.size,
            kind,
            ordinal,
            text_variant,
        }
    }
}

/// Counts and file names derived from a namespace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub table_count: u32,
    pub image_count: u32,
    pub text_files: Vec<String>,
    pub generated_files: Vec<StoredEntry>,
}

#[derive(Debug, Clone)]
pub struct ResultIndex {
    namespace: String,
    artifacts: Vec<IndexedArtifact>,
}

impl ResultIndex {
    /// Lists `namespace` and classifies every blob in it.
    pub fn build(store: &dyn ArtifactStore, namespace: &str) -> Result<Self, StorageError> {
        Ok(Self::from_entries(namespace, store.list(namespace)?))
    }

    pub fn from_entries(namespace: &str, entries: Vec<StoredEntry>) -> Self {
        let mut artifacts: Vec<IndexedArtifact> =
            entries.into_iter().map(IndexedArtifact::from_entry).collect();
        artifacts.sort_by(|a, b| {
            a.ordinal
                .cmp(&b.ordinal)
                .then_with(|| a.name.cmp(&b.name))
        });
        Self {
            namespace: namespace.to_string(),
            artifacts,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Storage key of an artifact in this namespace.
    pub fn key(&self, name: &str) -> String {
        join_key(&self.namespace, name)
    }

    /// Every artifact, sorted by name.
    pub fn all(&self) -> Vec<&IndexedArtifact> {
        let mut all: Vec<&IndexedArtifact> = self.artifacts.iter().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// CSV/HTML pairs in table order.
    pub fn tables(&self) -> Vec<&IndexedArtifact> {
        self.artifacts.iter().filter(|a| a.kind.is_table()).collect()
    }

    /// Table images first, then pictures, each in element order.
    pub fn images(&self) -> Vec<&IndexedArtifact> {
        let mut images: Vec<&IndexedArtifact> =
            self.artifacts.iter().filter(|a| a.kind.is_image()).collect();
        images.sort_by_key(|a| (a.kind == ArtifactKind::PictureImage, a.ordinal));
        images
    }

    /// The markdown produced for this engine/force combination.
    pub fn text(&self, engine: &str, force_label: &str) -> Option<&IndexedArtifact> {
        self.artifacts.iter().find(|a| {
            a.text_variant
                .as_ref()
                .is_some_and(|(e, f)| e == engine && f == force_label)
        })
    }

    pub fn find(&self, name: &str) -> Option<&IndexedArtifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn summary(&self) -> IndexSummary {
        let mut table_ordinals: Vec<u32> = self
            .artifacts
            .iter()
            .filter(|a| a.kind.is_table())
            .filter_map(|a| a.ordinal)
            .collect();
        table_ordinals.dedup();

        IndexSummary {
            table_count: table_ordinals.len() as u32,
            image_count: self.artifacts.iter().filter(|a| a.kind.is_image()).count() as u32,
            text_files: self
                .artifacts
                .iter()
                .filter(|a| a.kind == ArtifactKind::Text)
                .map(|a| a.name.clone())
                .collect(),
            generated_files: self
                .all()
                .into_iter()
                .map(|a| StoredEntry {
                    name: a.name.clone(),
                    size: a.size,
                })
                .collect(),
        }
    }
}
