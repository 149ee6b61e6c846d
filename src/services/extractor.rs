//! Page-wise text extraction from PDF bytes.

use lopdf::Document;

use crate::error::ExtractionError;
use crate::models::Page;

/// Extract text content from a PDF, per page.
///
/// Pages are numbered 1-based with no gaps, in document order. Pages
/// whose content cannot be decoded contribute empty text rather than
/// failing the document; deciding that an all-blank document is an
/// error is the orchestrator's call.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<Page>, ExtractionError> {
    let doc =
        Document::load_mem(bytes).map_err(|e| ExtractionError::Unparseable(e.to_string()))?;

    let page_map = doc.get_pages();
    if page_map.is_empty() {
        return Err(ExtractionError::NoPages);
    }

    let mut pages = Vec::with_capacity(page_map.len());
    for (ordinal, (&pdf_page, _)) in page_map.iter().enumerate() {
        let text = doc.extract_text(&[pdf_page]).unwrap_or_default();
        pages.push(Page {
            number: ordinal as u32 + 1,
            text,
        });
    }

    Ok(pages)
}

/// Build an in-memory PDF with one page per entry in `page_texts`.
#[cfg(test)]
pub(crate) fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}
