//! Text-device scenarios: spans, Unicode mapping, metrics-driven layout.

mod common;

use bytes::Bytes;
use common::PdfBuilder;
use pdf_raster::{Document, RenderOptions, extract_page_text};

const TO_UNICODE: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CMapName /Custom-UCS def
/CMapType 2 def
1 begincodespacerange
<00> <FF>
endcodespacerange
2 beginbfchar
<48> <0048>
<69> <0069>
endbfchar
endcmap
end
end";

fn helvetica_page(content: &str) -> Vec<u8> {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    b.object(
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>",
    );
    b.stream(4, "", content.as_bytes());
    b.object(
        5,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /ToUnicode 6 0 R >>",
    );
    b.stream(6, "", TO_UNICODE.as_bytes());
    b.build(1)
}

#[test]
fn test_hello_span_with_helvetica_metrics() {
    let pdf = helvetica_page("BT /F1 12 Tf 10 10 Td (Hi) Tj ET");
    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    let spans = extract_page_text(&mut doc, 0, &RenderOptions::default()).unwrap();

    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.font_name, "Helvetica");
    let text: String = span.chars.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("");
    assert_eq!(text, "Hi");

    // Baseline at user (10,10): device y = 100 - 10 = 90 at 72 dpi
    let h = &span.chars[0];
    assert!((h.origin.x - 10.0).abs() < 1e-3, "{:?}", h.origin);
    assert!((h.origin.y - 90.0).abs() < 1e-3, "{:?}", h.origin);
    assert!((h.size - 12.0).abs() < 1e-3);

    // The second glyph advances by Helvetica's H width: 722/1000 * 12pt
    let i = &span.chars[1];
    let expected = 10.0 + 0.722 * 12.0;
    assert!((i.origin.x - expected).abs() < 1e-3, "{} vs {expected}", i.origin.x);
}

#[test]
fn test_tj_kerning_moves_following_glyphs() {
    let pdf = helvetica_page("BT /F1 10 Tf 0 0 Td [(H) -500 (i)] TJ ET");
    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    let spans = extract_page_text(&mut doc, 0, &RenderOptions::default()).unwrap();

    // Two Tj runs inside one TJ produce two spans; gather all chars
    let chars: Vec<_> = spans.iter().flat_map(|s| s.chars.iter()).collect();
    assert_eq!(chars.len(), 2);
    // H advance 7.22, then kerning -(-500)/1000*10 = +5
    let expected = 0.722 * 10.0 + 0.5 * 10.0;
    assert!(
        (chars[1].origin.x - expected).abs() < 1e-3,
        "{} vs {expected}",
        chars[1].origin.x
    );
}

#[test]
fn test_invisible_text_extracted() {
    let pdf = helvetica_page("BT /F1 12 Tf 3 Tr 10 10 Td (Hi) Tj ET");
    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    let spans = extract_page_text(&mut doc, 0, &RenderOptions::default()).unwrap();
    let text: String = spans
        .iter()
        .flat_map(|s| s.chars.iter())
        .map(|c| c.text.as_str())
        .collect();
    assert_eq!(text, "Hi");
}

#[test]
fn test_leading_and_tstar_stack_lines() {
    let pdf = helvetica_page("BT /F1 12 Tf 14 TL 10 90 Td (Hi) Tj T* (Hi) Tj ET");
    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    let spans = extract_page_text(&mut doc, 0, &RenderOptions::default()).unwrap();
    assert_eq!(spans.len(), 2);
    let first_y = spans[0].chars[0].origin.y;
    let second_y = spans[1].chars[0].origin.y;
    // Device y grows downward: the second line sits 14 units lower
    assert!((second_y - first_y - 14.0).abs() < 1e-3, "{first_y} {second_y}");
    // Both lines start at the same x
    assert!((spans[0].chars[0].origin.x - spans[1].chars[0].origin.x).abs() < 1e-3);
}

#[test]
fn test_word_spacing_applies_to_spaces() {
    let pdf = helvetica_page("BT /F1 10 Tf 5 Tw 0 0 Td (a a) Tj ET");
    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    let spans = extract_page_text(&mut doc, 0, &RenderOptions::default()).unwrap();
    let chars = &spans[0].chars;
    assert_eq!(chars.len(), 3);
    // a = 556, space = 278 plus 5 word spacing
    let expected_third = 0.556 * 10.0 + 0.278 * 10.0 + 5.0;
    assert!(
        (chars[2].origin.x - expected_third).abs() < 1e-3,
        "{} vs {expected_third}",
        chars[2].origin.x
    );
}
