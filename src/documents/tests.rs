use super::*;
use std::fs;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

#[test]
fn segment_slices_document_text() {
    let document = Document::new("notes.txt", "alpha beta gamma");
    let segment = document.segment(6..10).expect("range is valid");

    assert_eq!(segment.text(), "beta");
    assert_eq!(segment.source(), "notes.txt");
    assert_eq!(segment.id().document, document.id());
    assert_eq!(segment.byte_range(), 6..10);
}

#[test]
fn segment_rejects_invalid_ranges() {
    let document = Document::new("notes.txt", "héllo");

    // 'é' spans bytes 1..3
    assert!(document.segment(0..2).is_none());
    assert!(document.segment(0..42).is_none());
    assert!(document.segment(0..3).is_some());
}

#[test]
fn url_ids_are_stable() {
    let first = DocumentId::from_url("https://example.com/page");
    let second = DocumentId::from_url("https://example.com/page");
    let other = DocumentId::from_url("https://example.com/other");

    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_ne!(DocumentId::new(), DocumentId::new());
}

#[test]
fn markdown_keeps_paragraph_breaks() {
    let markdown = "# Title\n\nFirst *paragraph* here.\n\n- item one\n- item two\n\n`code`";
    let text = DocumentFormat::Markdown.extract_text(markdown);

    assert!(text.starts_with("Title\n\n"));
    assert!(text.contains("First paragraph here."));
    assert!(text.contains("item one"));
    assert!(!text.contains('#'));
    assert!(!text.contains('*'));
}

#[test]
fn html_extracts_blocks_and_skips_scripts() {
    let html = r#"
        <html><head><script>var tracking = 1;</script></head>
        <body>
            <h1>Welcome</h1>
            <p>Retrieval   augmented
               generation.</p>
        </body></html>
    "#;
    let text = DocumentFormat::Html.extract_text(html);

    assert_eq!(text, "Welcome\n\nRetrieval augmented generation.");
}

#[test]
fn format_detection() {
    assert_eq!(
        DocumentFormat::from_path(Path::new("a/b/readme.MD")),
        Some(DocumentFormat::Markdown)
    );
    assert_eq!(DocumentFormat::from_path(Path::new("slides.pdf")), None);
    assert_eq!(
        DocumentFormat::from_content_type("text/html; charset=utf-8"),
        Some(DocumentFormat::Html)
    );
    assert_eq!(DocumentFormat::from_content_type("application/pdf"), None);
}

#[tokio::test]
async fn load_text_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let file_path = temp_dir.path().join("notes.txt");
    fs::write(&file_path, "Some notes.\n\nMore notes.").expect("should write file");

    let loader = DefaultDocumentLoader::default();
    let document = loader
        .load(file_path.to_str().expect("path is utf-8"))
        .await
        .expect("load should succeed");

    assert_eq!(document.text(), "Some notes.\n\nMore notes.");
    assert!(document.source().ends_with("notes.txt"));
}

#[tokio::test]
async fn load_missing_file() {
    let loader = DefaultDocumentLoader::default();
    let result = loader.load("/definitely/not/here.txt").await;

    assert!(matches!(result, Err(RagError::NotFound(_))));
}

#[tokio::test]
async fn load_unsupported_format() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let file_path = temp_dir.path().join("slides.pdf");
    fs::write(&file_path, "%PDF-1.7").expect("should write file");

    let loader = DefaultDocumentLoader::default();
    let result = loader
        .load(file_path.to_str().expect("path is utf-8"))
        .await;

    assert!(matches!(result, Err(RagError::UnsupportedFormat(_))));
}

#[tokio::test]
async fn load_html_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guide"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body><p>Hello from the web.</p></body></html>", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let loader = DefaultDocumentLoader::default();
    let url = format!("{}/guide", server.uri());
    let document = loader.load(&url).await.expect("fetch should succeed");

    assert_eq!(document.text(), "Hello from the web.");
    assert_eq!(document.id(), DocumentId::from_url(&url));

    let missing = loader.load(&format!("{}/gone", server.uri())).await;
    assert!(matches!(missing, Err(RagError::NotFound(_))));
}
