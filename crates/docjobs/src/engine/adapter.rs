use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ConversionError, JobError, Result, StorageError};
use crate::job::record::JobSettings;
use crate::storage::{join_key, ArtifactStore};

use super::document::{Document, ElementKind};
use super::options::{EngineKind, PipelineOptions, DEFAULT_IMAGES_SCALE};

/// A document conversion engine.
///
/// Implementations may block for minutes or never return; callers run them
/// under a [`BoundedExecutor`](crate::executor::BoundedExecutor).
pub trait Converter: Send + Sync {
    fn convert(
        &self,
        path: &Path,
        options: &PipelineOptions,
    ) -> std::result::Result<Document, ConversionError>;
}

/// What one run wrote into its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    pub table_count: u32,
    pub image_count: u32,
    pub text_artifact_name: Option<String>,
}

/// Artifact file names shared by the adapter and the result index.
pub mod naming {
    pub fn table_csv(stem: &str, n: usize) -> String {
        format!("{}-table-{}.csv", stem, n)
    }

    pub fn table_html(stem: &str, n: usize) -> String {
        format!("{}-table-{}.html", stem, n)
    }

    pub fn table_image(stem: &str, n: usize) -> String {
        format!("{}-table-image-{}.png", stem, n)
    }

    pub fn picture(stem: &str, n: usize) -> String {
        format!("{}-picture-{}.png", stem, n)
    }

    pub fn full_text(stem: &str, engine: &str, force_label: &str) -> String {
        format!("{}_full_text_{}_{}.md", stem, engine, force_label)
    }

    /// File stem of an uploaded document name, `document` when it has none.
    ///
    /// Directories sent by the client are dropped whichever separator they use.
    pub fn doc_stem(original_name: &str) -> String {
        std::path::Path::new(crate::sanitize::base_name(original_name.trim()))
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string())
    }
}

/// Uniform front over the engine set: resolves the converter for a run's
/// engine, invokes it, and writes its output into the run namespace.
pub struct EngineAdapter {
    store: Arc<dyn ArtifactStore>,
    converters: HashMap<EngineKind, Arc<dyn Converter>>,
    images_scale: f32,
}

impl EngineAdapter {
    /// Uses `converter` for every engine.
    pub fn new(store: Arc<dyn ArtifactStore>, converter: Arc<dyn Converter>) -> Self {
        let converters = EngineKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::clone(&converter)))
            .collect();
        Self {
            store,
            converters,
            images_scale: DEFAULT_IMAGES_SCALE,
        }
    }

    /// Routes `engine` to a dedicated converter.
    pub fn with_engine(mut self, engine: EngineKind, converter: Arc<dyn Converter>) -> Self {
        self.converters.insert(engine, converter);
        self
    }

    pub fn with_images_scale(mut self, images_scale: f32) -> Self {
        self.images_scale = images_scale;
        self
    }

    /// Resolves an engine name without starting any work.
    pub fn resolve(&self, engine_name: &str) -> Result<EngineKind> {
        let kind: EngineKind = engine_name.parse()?;
        if self.converters.contains_key(&kind) {
            Ok(kind)
        } else {
            Err(JobError::UnsupportedEngine(engine_name.to_string()))
        }
    }

    /// Converts `input` and writes every requested artifact under `namespace`.
    ///
    /// Artifact names derive from the stem of `input_name`.
    pub fn run(
        &self,
        input: &[u8],
        namespace: &str,
        input_name: &str,
        settings: &JobSettings,
    ) -> Result<ArtifactManifest> {
        let converter = self
            .converters
            .get(&settings.engine)
            .ok_or_else(|| JobError::UnsupportedEngine(settings.engine.to_string()))?;

        let _span = tracing::info_span!(
            "engine.run",
            engine = %settings.engine,
            force = settings.force_full_page_ocr,
            namespace = %namespace
        )
        .entered();

        let doc_stem = naming::doc_stem(input_name);
        let doc_stem = doc_stem.as_str();
        let extension = Path::new(input_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("pdf");
        let staged = stage_input(input, extension)?;
        let options = PipelineOptions::new(
            settings.engine,
            settings.force_full_page_ocr,
            settings.extract_tables,
            settings.extract_images,
            self.images_scale,
        );

        let document = converter.convert(staged.path(), &options)?;
        log::debug!(
            "Engine {} returned {} table(s), {} element(s)",
            settings.engine,
            document.tables().len(),
            document.iterate_elements().count()
        );

        let mut manifest = ArtifactManifest {
            table_count: 0,
            image_count: 0,
            text_artifact_name: None,
        };

        if settings.extract_tables {
            for (i, table) in document.tables().iter().enumerate() {
                let n = i + 1;
                self.put(namespace, &naming::table_csv(doc_stem, n), table.export_csv().as_bytes())?;
                self.put(namespace, &naming::table_html(doc_stem, n), table.export_html().as_bytes())?;
            }
            manifest.table_count = document.tables().len() as u32;
        }

        if settings.extract_images {
            let mut table_images = 0;
            let mut pictures = 0;
            for element in document.iterate_elements() {
                let name = match element.kind {
                    ElementKind::Table => {
                        table_images += 1;
                        naming::table_image(doc_stem, table_images)
                    }
                    ElementKind::Picture => {
                        pictures += 1;
                        naming::picture(doc_stem, pictures)
                    }
                };
                match &element.image {
                    Some(png) => {
                        self.put(namespace, &name, png)?;
                        manifest.image_count += 1;
                    }
                    None => log::debug!("No image rendered for {}", name),
                }
            }
        }

        if settings.extract_text {
            let name = naming::full_text(doc_stem, settings.engine.as_str(), settings.force_label());
            self.put(namespace, &name, document.export_markdown().as_bytes())?;
            manifest.text_artifact_name = Some(name);
        }

        log::info!(
            "Engine {} wrote {} table(s), {} image(s) to {}",
            settings.engine,
            manifest.table_count,
            manifest.image_count,
            namespace
        );

        Ok(manifest)
    }

    fn put(&self, namespace: &str, name: &str, bytes: &[u8]) -> Result<()> {
        self.store.put(&join_key(namespace, name), bytes)?;
        Ok(())
    }
}

/// Engines read from a path; the upload lives in the artifact store.
fn stage_input(input: &[u8], extension: &str) -> Result<tempfile::NamedTempFile> {
    let write_err = |path: &Path, source| StorageError::WriteFile {
        path: path.to_path_buf(),
        source,
    };

    let mut staged = tempfile::Builder::new()
        .prefix("docjobs-input-")
        .suffix(&format!(".{}", extension))
        .tempfile()
        .map_err(|e| write_err(&std::env::temp_dir(), e))?;
    staged
        .write_all(input)
        .and_then(|_| staged.flush())
        .map_err(|e| write_err(staged.path(), e))?;
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::document::Table;
    use crate::job::record::RequestedKind;
    use crate::storage::FileStorage;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns a fixed document and records the options it was called with.
    struct FixedConverter {
        document: Document,
        seen: Mutex<Vec<PipelineOptions>>,
    }

    impl Converter for FixedConverter {
        fn convert(
            &self,
            path: &Path,
            options: &PipelineOptions,
        ) -> std::result::Result<Document, ConversionError> {
            assert!(path.exists());
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));
            self.seen.lock().unwrap().push(options.clone());
            Ok(self.document.clone())
        }
    }

    struct BrokenConverter;

    impl Converter for BrokenConverter {
        fn convert(
            &self,
            _path: &Path,
            _options: &PipelineOptions,
        ) -> std::result::Result<Document, ConversionError> {
            Err(ConversionError::Engine("model weights missing".to_string()))
        }
    }

    fn sample_document() -> Document {
        let mut doc = Document::new("# Report");
        for i in 0..2 {
            doc.push_table(
                Table::new(vec!["k".into()], vec![vec![i.to_string()]]).with_image(vec![0x89, b'P']),
            );
        }
        doc.push_picture(Some(vec![0x89, b'P']));
        doc.push_picture(None);
        doc
    }

    fn setup(document: Document) -> (TempDir, Arc<FileStorage>, Arc<FixedConverter>, EngineAdapter) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStorage::new(dir.path()));
        let converter = Arc::new(FixedConverter {
            document,
            seen: Mutex::new(Vec::new()),
        });
        let adapter = EngineAdapter::new(store.clone(), converter.clone());
        (dir, store, converter, adapter)
    }

    #[test]
    fn test_run_writes_named_artifacts() {
        let (_dir, store, _conv, adapter) = setup(sample_document());
        let settings = JobSettings::new("rapidocr", true).unwrap();

        let manifest = adapter
            .run(b"%PDF-1.5", "results/run1", "report.pdf", &settings)
            .unwrap();
        assert_eq!(manifest.table_count, 2);
        assert_eq!(manifest.image_count, 3);
        assert_eq!(
            manifest.text_artifact_name.as_deref(),
            Some("report_full_text_rapidocr_force_true.md")
        );

        let names: Vec<String> = store
            .list("results/run1")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "report-picture-1.png",
                "report-table-1.csv",
                "report-table-1.html",
                "report-table-2.csv",
                "report-table-2.html",
                "report-table-image-1.png",
                "report-table-image-2.png",
                "report_full_text_rapidocr_force_true.md",
            ]
        );
        assert_eq!(
            store
                .get("results/run1/report_full_text_rapidocr_force_true.md")
                .unwrap()
                .unwrap(),
            b"# Report"
        );
    }

    #[test]
    fn test_run_respects_requested_kinds() {
        let (_dir, store, conv, adapter) = setup(sample_document());
        let settings = JobSettings::new("tesseract", false)
            .unwrap()
            .with_kinds(&[RequestedKind::Tables]);

        let manifest = adapter
            .run(b"%PDF-1.5", "results/run2", "report.pdf", &settings)
            .unwrap();
        assert_eq!(manifest.table_count, 2);
        assert_eq!(manifest.image_count, 0);
        assert!(manifest.text_artifact_name.is_none());
        assert_eq!(store.list("results/run2").unwrap().len(), 4);

        let seen = conv.seen.lock().unwrap();
        assert!(seen[0].do_table_structure);
        assert!(!seen[0].generate_picture_images);
        assert_eq!(seen[0].ocr.engine(), EngineKind::Tesseract);
    }

    #[test]
    fn test_engine_override() {
        let (_dir, _store, _conv, adapter) = setup(sample_document());
        let adapter = adapter.with_engine(EngineKind::EasyOcr, Arc::new(BrokenConverter));
        let settings = JobSettings::new("easyocr", false).unwrap();

        let err = adapter
            .run(b"%PDF-1.5", "results/run3", "report.pdf", &settings)
            .unwrap_err();
        assert!(matches!(err, JobError::EngineFailure(ref m) if m.contains("model weights")));
    }

    #[test]
    fn test_doc_stem_drops_client_directories() {
        assert_eq!(naming::doc_stem("report.pdf"), "report");
        assert_eq!(naming::doc_stem("C:\\scans\\report.pdf"), "report");
        assert_eq!(naming::doc_stem("/home/ana/scans/report.v2.pdf"), "report.v2");
        assert_eq!(naming::doc_stem("scans\\"), "document");
    }

    #[test]
    fn test_run_with_windows_path_name_writes_valid_keys() {
        let (_dir, store, _conv, adapter) = setup(sample_document());
        let settings = JobSettings::new("rapidocr", false).unwrap();

        let manifest = adapter
            .run(b"%PDF-1.5", "results/run4", "C:\\scans\\report.pdf", &settings)
            .unwrap();
        assert_eq!(
            manifest.text_artifact_name.as_deref(),
            Some("report_full_text_rapidocr_force_false.md")
        );
        assert!(store
            .list("results/run4")
            .unwrap()
            .iter()
            .all(|e| e.name.starts_with("report")));
    }

    #[test]
    fn test_resolve() {
        let (_dir, _store, _conv, adapter) = setup(Document::default());
        assert_eq!(adapter.resolve("ocrmac").unwrap(), EngineKind::OcrMac);
        assert!(matches!(
            adapter.resolve("cuneiform"),
            Err(JobError::UnsupportedEngine(_))
        ));
    }
}
