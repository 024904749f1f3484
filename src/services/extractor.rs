use crate::utils::validation::{DOCX_MIME, PDF_MIME};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

/// Extractions shorter than this are treated as failures by the caller, even
/// when parsing succeeded (image-only scans produce empty text).
pub const MIN_EXTRACTED_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),

    #[error("Failed to extract text from DOCX: {0}")]
    Docx(String),

    #[error("Unsupported file type for extraction: {0}")]
    UnsupportedType(String),
}

/// Pull plain text out of an uploaded document buffer.
///
/// Only the two MIME types accepted by upload validation reach this function;
/// anything else is a programming error upstream and maps to `UnsupportedType`.
pub fn extract_text(bytes: &[u8], mime_type: &str) -> Result<String, ExtractError> {
    match mime_type {
        PDF_MIME => extract_pdf_text(bytes),
        DOCX_MIME => extract_docx_text(bytes),
        other => Err(ExtractError::UnsupportedType(other.to_string())),
    }
}

/// All pages concatenated in document order.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    if doc.is_encrypted() {
        return Err(ExtractError::Pdf("document is encrypted".to_string()));
    }

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let text = doc
        .extract_text(&pages)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    Ok(text.trim().to_string())
}

/// Raw text body of `word/document.xml`, styling discarded.
fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(format!("not a valid DOCX archive: {}", e)))?;

    let mut document = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("missing word/document.xml".to_string()))?;

    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Docx(format!("unreadable document XML: {}", e)))?;

    let mut reader = XmlReader::from_str(&xml);
    let mut output = String::new();
    let mut in_text_node = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = true,
                b"w:tab" => output.push('\t'),
                b"w:br" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => output.push('\t'),
                b"w:br" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let raw = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|e| ExtractError::Docx(e.to_string()))?;
                    let value = quick_xml::escape::unescape(&raw)
                        .map_err(|e| ExtractError::Docx(e.to_string()))?;
                    output.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = false,
                // Paragraph boundary
                b"w:p" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(format!("XML parse error: {}", e))),
            _ => {}
        }
    }

    Ok(output.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn docx_with_body(xml_body: &str) -> Vec<u8> {
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>{}</w:body>
</w:document>"#,
            xml_body
        );

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", FileOptions::default())
            .unwrap();
        writer.write_all(document.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_docx_extraction() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>This project report presents the design of a solar tracker.</w:t></w:r></w:p>\
             <w:p><w:r><w:t>The system was implemented using an embedded controller.</w:t></w:r></w:p>",
        );

        let text = extract_text(&bytes, DOCX_MIME).unwrap();
        assert!(text.contains("solar tracker"));
        assert!(text.contains("embedded controller"));
        // Paragraph boundary preserved as a line break
        assert!(text.contains("tracker.\n"));
        assert!(text.len() >= MIN_EXTRACTED_CHARS);
    }

    #[test]
    fn test_docx_entities_are_unescaped() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Design &amp; Implementation of &quot;smart&quot; grids</w:t></w:r></w:p>",
        );
        let text = extract_text(&bytes, DOCX_MIME).unwrap();
        assert_eq!(text, "Design & Implementation of \"smart\" grids");
    }

    #[test]
    fn test_docx_tabs_and_breaks() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Chapter 1</w:t><w:tab/><w:t>Introduction</w:t><w:br/><w:t>Page 1</w:t></w:r></w:p>",
        );
        let text = extract_text(&bytes, DOCX_MIME).unwrap();
        assert_eq!(text, "Chapter 1\tIntroduction\nPage 1");
    }

    #[test]
    fn test_docx_without_document_xml() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("other.txt", FileOptions::default())
            .unwrap();
        writer.write_all(b"not a docx").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = extract_text(&bytes, DOCX_MIME).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn test_corrupt_pdf() {
        let err = extract_text(b"%PDF-1.5 garbage that is not a document", PDF_MIME).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_corrupt_docx() {
        let err = extract_text(b"PK\x03\x04 truncated archive", DOCX_MIME).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn test_pdf_without_text_is_below_minimum() {
        use lopdf::{dictionary, Document, Object, Stream};

        // Valid single-page PDF with an empty content stream: the image-only
        // scan case. Extraction succeeds but yields no usable text.
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let text = extract_text(&bytes, PDF_MIME).unwrap();
        assert!(text.trim().len() < MIN_EXTRACTED_CHARS);
    }

    #[test]
    fn test_unsupported_type() {
        let err = extract_text(b"hello", "text/plain").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType(_)));
    }
}
