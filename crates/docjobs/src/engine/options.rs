//! Engine selection and conversion pipeline options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Default rendering scale for generated page/element images (2.0 = 144 DPI).
pub const DEFAULT_IMAGES_SCALE: f32 = 2.0;

/// The closed set of OCR engines a run can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    RapidOcr,
    Tesseract,
    EasyOcr,
    OcrMac,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        EngineKind::RapidOcr,
        EngineKind::Tesseract,
        EngineKind::EasyOcr,
        EngineKind::OcrMac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::RapidOcr => "rapidocr",
            EngineKind::Tesseract => "tesseract",
            EngineKind::EasyOcr => "easyocr",
            EngineKind::OcrMac => "ocrmac",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        EngineKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| JobError::UnsupportedEngine(name.to_string()))
    }
}

/// Per-engine OCR configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum OcrOptions {
    RapidOcr { force_full_page_ocr: bool },
    Tesseract { force_full_page_ocr: bool, lang: Vec<String> },
    EasyOcr { force_full_page_ocr: bool },
    OcrMac { force_full_page_ocr: bool },
}

impl OcrOptions {
    pub fn for_engine(engine: EngineKind, force_full_page_ocr: bool) -> Self {
        match engine {
            EngineKind::RapidOcr => OcrOptions::RapidOcr { force_full_page_ocr },
            EngineKind::Tesseract => OcrOptions::Tesseract {
                force_full_page_ocr,
                lang: vec!["auto".to_string()],
            },
            EngineKind::EasyOcr => OcrOptions::EasyOcr { force_full_page_ocr },
            EngineKind::OcrMac => OcrOptions::OcrMac { force_full_page_ocr },
        }
    }

    pub fn engine(&self) -> EngineKind {
        match self {
            OcrOptions::RapidOcr { .. } => EngineKind::RapidOcr,
            OcrOptions::Tesseract { .. } => EngineKind::Tesseract,
            OcrOptions::EasyOcr { .. } => EngineKind::EasyOcr,
            OcrOptions::OcrMac { .. } => EngineKind::OcrMac,
        }
    }

    pub fn force_full_page_ocr(&self) -> bool {
        match self {
            OcrOptions::RapidOcr { force_full_page_ocr }
            | OcrOptions::Tesseract {
                force_full_page_ocr,
                ..
            }
            | OcrOptions::EasyOcr { force_full_page_ocr }
            | OcrOptions::OcrMac { force_full_page_ocr } => *force_full_page_ocr,
        }
    }
}

/// Options handed to a [`Converter`](super::adapter::Converter) for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// OCR always runs; `force_full_page_ocr` decides whether it replaces the text layer.
    pub do_ocr: bool,
    pub do_table_structure: bool,
    pub do_cell_matching: bool,
    pub generate_picture_images: bool,
    pub images_scale: f32,
    pub ocr: OcrOptions,
}

impl PipelineOptions {
    pub fn new(
        engine: EngineKind,
        force_full_page_ocr: bool,
        extract_tables: bool,
        extract_images: bool,
        images_scale: f32,
    ) -> Self {
        Self {
            do_ocr: true,
            do_table_structure: extract_tables,
            do_cell_matching: extract_tables,
            generate_picture_images: extract_images,
            images_scale,
            ocr: OcrOptions::for_engine(engine, force_full_page_ocr),
        }
    }
}
