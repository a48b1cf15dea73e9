//! The conversion-engine boundary.
//!
//! Engines are external collaborators behind [`Converter`]. The
//! [`EngineAdapter`] picks one per run from the closed [`EngineKind`] set
//! and turns the returned [`Document`] into named artifacts.

pub mod adapter;
pub mod document;
pub mod options;
pub mod pdf;

pub use adapter::{naming, ArtifactManifest, Converter, EngineAdapter};
pub use document::{Document, Element, ElementKind, Table};
pub use options::{EngineKind, OcrOptions, PipelineOptions};
pub use pdf::PdfTextConverter;
