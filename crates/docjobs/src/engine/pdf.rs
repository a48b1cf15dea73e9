use std::io::Cursor;
use std::path::Path;

use lopdf::Object;

use crate::error::ConversionError;

use super::adapter::Converter;
use super::document::Document;
use super::options::PipelineOptions;

/// Built-in converter that reads the PDF text layer with lopdf.
///
/// It performs no OCR and finds no tables: every page becomes a markdown
/// section and embedded JPEG images become pictures. Real engines plug in
/// through [`Converter`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextConverter;

impl PdfTextConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for PdfTextConverter {
    fn convert(&self, path: &Path, options: &PipelineOptions) -> Result<Document, ConversionError> {
        let _span = tracing::info_span!("engine.pdf_text").entered();

        let bytes = std::fs::read(path).map_err(|e| ConversionError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;
        let doc = lopdf::Document::load_mem(&bytes)
            .map_err(|e| ConversionError::Load(e.to_string()))?;

        if options.ocr.force_full_page_ocr() {
            log::debug!(
                "No OCR backend for {}; using the text layer",
                options.ocr.engine()
            );
        }

        let mut document = Document::new(extract_markdown(&doc));

        if options.generate_picture_images {
            for png in extract_jpeg_images(&doc) {
                document.push_picture(Some(png));
            }
        }

        Ok(document)
    }
}

fn extract_markdown(doc: &lopdf::Document) -> String {
    let mut markdown = String::new();

    for page_num in doc.get_pages().keys() {
        if !markdown.is_empty() {
            markdown.push('\n');
        }
        markdown.push_str(&format!("## Page {}\n\n", page_num));
        match doc.extract_text(&[*page_num]) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    markdown.push_str(text);
                    markdown.push('\n');
                }
            }
            Err(e) => log::warn!("Failed to extract text from page {}: {}", page_num, e),
        }
    }

    markdown
}

/// Re-encodes every DCT-compressed image XObject as PNG, in object order.
fn extract_jpeg_images(doc: &lopdf::Document) -> Vec<Vec<u8>> {
    let mut images = Vec::new();

    for (id, object) in &doc.objects {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !has_name(stream.dict.get(b"Subtype").ok(), b"Image")
            || !has_name(stream.dict.get(b"Filter").ok(), b"DCTDecode")
        {
            continue;
        }

        let decoded =
            image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg);
        let mut png = Vec::new();
        match decoded.and_then(|img| img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)) {
            Ok(()) => images.push(png),
            Err(e) => log::warn!("Skipping undecodable image object {:?}: {}", id, e),
        }
    }

    images
}

fn has_name(object: Option<&Object>, expected: &[u8]) -> bool {
    match object {
        Some(Object::Name(name)) => name == expected,
        Some(Object::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Object::Name(name) if name == expected)),
        _ => false,
    }
}
