use super::*;
use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};
use tempfile::TempDir;

/// Write a PDF with one text line per page
fn write_pdf(path: &Path, pages: &[&str]) {
    let pages: Vec<Option<&str>> = pages.iter().copied().map(Some).collect();
    write_pdf_pages(path, &pages);
}

/// Like `write_pdf`, but `None` writes a page without a `Contents` entry
fn write_pdf_pages(path: &Path, pages: &[Option<&str>]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for page in pages {
        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        };
        if let Some(text) = page {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("content should encode"),
            ));
            page_dict.set("Contents", content_id);
        }
        kids.push(doc.add_object(page_dict).into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("pdf should save");
}

#[test]
fn missing_directory_has_no_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let missing = temp_dir.path().join("dataset");

    match list_pdf_files(&missing) {
        Err(QaError::NoDocumentsFound { dir }) => assert_eq!(dir, missing),
        other => panic!("expected NoDocumentsFound, got {other:?}"),
    }
}

#[test]
fn directory_without_pdfs_has_no_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(temp_dir.path().join("notes.txt"), "not a pdf").expect("should write file");
    fs::create_dir(temp_dir.path().join("nested.pdf")).expect("should create dir");

    let result = PdfDirectory::new(temp_dir.path()).load_text();
    assert!(matches!(result, Err(QaError::NoDocumentsFound { .. })));
}

#[test]
fn pdf_files_are_listed_in_name_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_pdf(&temp_dir.path().join("b-guide.pdf"), &["second"]);
    write_pdf(&temp_dir.path().join("a-faq.PDF"), &["first"]);
    fs::write(temp_dir.path().join("readme.md"), "ignored").expect("should write file");

    let files = list_pdf_files(temp_dir.path()).expect("should list pdfs");
    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();
    assert_eq!(names, vec!["a-faq.PDF", "b-guide.pdf"]);
}

#[test]
fn pages_are_extracted_in_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("faq.pdf");
    write_pdf(&path, &["Page one text", "Page two text", "Page three text"]);

    let pages = extract_pdf_pages(&path).expect("should extract pages");
    assert_eq!(pages.len(), 3);
    assert!(pages[0].contains("Page one text"));
    assert!(pages[1].contains("Page two text"));
    assert!(pages[2].contains("Page three text"));
}

#[test]
fn pages_without_text_contribute_empty_strings() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("sparse.pdf");
    write_pdf_pages(&path, &[Some("Alpha"), None, Some(""), Some("Gamma")]);

    let pages = extract_pdf_pages(&path).expect("should extract pages");
    let trimmed: Vec<&str> = pages.iter().map(|page| page.trim()).collect();
    assert_eq!(trimmed, vec!["Alpha", "", "", "Gamma"]);

    let text = PdfDirectory::new(temp_dir.path())
        .load_text()
        .expect("blank pages should not fail the corpus");
    let alpha = text.find("Alpha").expect("first page present");
    let gamma = text.find("Gamma").expect("last page present");
    assert!(alpha < gamma);
}

#[test]
fn corpus_concatenates_files_then_pages() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_pdf(
        &temp_dir.path().join("01.pdf"),
        &["Coursevita mentorship", "Placement support"],
    );
    write_pdf(&temp_dir.path().join("02.pdf"), &["Refund policy"]);

    let source = PdfDirectory::new(temp_dir.path());
    let text = source.load_text().expect("should load corpus");

    let mentorship = text.find("Coursevita mentorship").expect("first page present");
    let placement = text.find("Placement support").expect("second page present");
    let refund = text.find("Refund policy").expect("second file present");
    assert!(mentorship < placement);
    assert!(placement < refund);
    assert!(source.describe().contains("PDF directory"));
}

#[test]
fn unparseable_pdf_is_a_document_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("broken.pdf");
    fs::write(&path, b"%PDF-1.5 this is not really a pdf").expect("should write file");

    let result = extract_pdf_pages(&path);
    assert!(matches!(result, Err(QaError::Document(_))));
}

#[test]
fn static_text_returns_its_contents() {
    let source = StaticText::new("hello corpus");
    assert_eq!(source.load_text().expect("should load"), "hello corpus");
    assert!(source.describe().contains("12 bytes"));
}
