//! Converters with scripted behavior.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

use docjobs::engine::{Converter, Document, PipelineOptions, Table};
use docjobs::ConversionError;

/// A 1x1 PNG, enough for anything that only stores image bytes.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Returns the same document on every call.
pub struct ScriptedConverter {
    markdown: String,
    tables: usize,
    pictures: usize,
    table_images: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<PipelineOptions>>,
}

impl ScriptedConverter {
    pub fn new(markdown: &str, tables: usize) -> Self {
        Self {
            markdown: markdown.to_string(),
            tables,
            pictures: 0,
            table_images: false,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pictures(mut self, pictures: usize) -> Self {
        self.pictures = pictures;
        self
    }

    pub fn with_table_images(mut self) -> Self {
        self.table_images = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_options(&self) -> Vec<PipelineOptions> {
        self.seen.lock().unwrap().clone()
    }

    fn document(&self) -> Document {
        let mut document = Document::new(self.markdown.clone());
        for n in 1..=self.tables {
            let table = Table::new(
                vec!["Item".to_string(), "Amount".to_string()],
                vec![vec![format!("row {}", n), format!("{}.00", n * 10)]],
            );
            let table = if self.table_images {
                table.with_image(TINY_PNG.to_vec())
            } else {
                table
            };
            document.push_table(table);
        }
        for _ in 0..self.pictures {
            document.push_picture(Some(TINY_PNG.to_vec()));
        }
        document
    }
}

impl Converter for ScriptedConverter {
    fn convert(
        &self,
        path: &Path,
        options: &PipelineOptions,
    ) -> Result<Document, ConversionError> {
        assert!(path.exists(), "staged input missing: {}", path.display());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(options.clone());
        Ok(self.document())
    }
}

/// Never returns.
pub struct HangingConverter {
    calls: AtomicUsize,
}

impl HangingConverter {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Converter for HangingConverter {
    fn convert(
        &self,
        _path: &Path,
        _options: &PipelineOptions,
    ) -> Result<Document, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        loop {
            thread::sleep(Duration::from_secs(3600));
        }
    }
}

/// Always raises the given message.
pub struct FailingConverter {
    message: String,
}

impl FailingConverter {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl Converter for FailingConverter {
    fn convert(
        &self,
        _path: &Path,
        _options: &PipelineOptions,
    ) -> Result<Document, ConversionError> {
        Err(ConversionError::Engine(self.message.clone()))
    }
}

/// Blocks inside `convert` until [`release`](Self::release) is called, then
/// delegates to a scripted converter.
pub struct GatedConverter {
    inner: ScriptedConverter,
    entered: Mutex<usize>,
    entered_signal: Condvar,
    open: Mutex<bool>,
    open_signal: Condvar,
}

impl GatedConverter {
    pub fn new(inner: ScriptedConverter) -> Self {
        Self {
            inner,
            entered: Mutex::new(0),
            entered_signal: Condvar::new(),
            open: Mutex::new(false),
            open_signal: Condvar::new(),
        }
    }

    /// Number of calls that reached the engine.
    pub fn entered(&self) -> usize {
        *self.entered.lock().unwrap()
    }

    /// Waits until `count` calls are inside the engine.
    pub fn wait_entered(&self, count: usize, timeout: Duration) -> bool {
        let guard = self.entered.lock().unwrap();
        let (guard, _) = self
            .entered_signal
            .wait_timeout_while(guard, timeout, |n| *n < count)
            .unwrap();
        *guard >= count
    }

    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.open_signal.notify_all();
    }
}

impl Converter for GatedConverter {
    fn convert(
        &self,
        path: &Path,
        options: &PipelineOptions,
    ) -> Result<Document, ConversionError> {
        *self.entered.lock().unwrap() += 1;
        self.entered_signal.notify_all();

        let open = self.open.lock().unwrap();
        let _open = self.open_signal.wait_while(open, |open| !*open).unwrap();
        self.inner.convert(path, options)
    }
}
