//! Document-level scenarios: indirect lengths, repair, boundary cases.

mod common;

use bytes::Bytes;
use common::{PdfBuilder, one_page_pdf};
use pdf_raster::object::{DictExt, ObjRef, Object};
use pdf_raster::{Document, RenderOptions, render_page};

#[test]
fn test_indirect_stream_length() {
    // A stream whose /Length is an indirect reference resolving to 42
    let payload = vec![b'x'; 42];
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    b.object(
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 50 50] /Contents 4 0 R >>",
    );
    {
        // Hand-rolled stream with the indirect /Length
        let mut body = Vec::new();
        body.extend_from_slice(b"<< /Length 9 0 R >>\nstream\n");
        body.extend_from_slice(&payload);
        body.extend_from_slice(b"\nendstream");
        b.object(4, std::str::from_utf8(&body).unwrap());
    }
    b.object(9, "42");

    let mut doc = Document::from_bytes(Bytes::from(b.build(1))).unwrap();
    let decoded = doc.open_stream(ObjRef::new(4, 0)).unwrap();
    assert_eq!(decoded.len(), 42);
    assert_eq!(decoded, payload);
}

#[test]
fn test_corrupted_startxref_repairs_and_renders_identically() {
    let pdf = one_page_pdf("0 0 40 40", "", "1 0 0 rg 0 0 40 40 re f");

    // Render the intact original
    let mut intact = Document::from_bytes(Bytes::from(pdf.clone())).unwrap();
    assert!(!intact.repaired);
    let reference = render_page(&mut intact, 0, &RenderOptions::default()).unwrap();

    // Corrupt the startxref offset
    let text = String::from_utf8_lossy(&pdf).into_owned();
    let broken = text.replace("startxref\n", "startxref\n9999");
    let mut repaired = Document::from_bytes(Bytes::from(broken.into_bytes())).unwrap();
    assert!(repaired.repaired);
    let rendered = render_page(&mut repaired, 0, &RenderOptions::default()).unwrap();

    assert_eq!(reference.samples, rendered.samples);
}

#[test]
fn test_object_streams_load() {
    // Page tree stored inside an /ObjStm, addressed by an xref stream
    let inner = b"<< /Type /Catalog /Pages 2 0 R >> << /Type /Pages /Kids [3 0 R] /Count 1 >>";
    let header = b"1 0 2 34 ";
    let mut objstm_data = Vec::new();
    objstm_data.extend_from_slice(header);
    objstm_data.extend_from_slice(inner);

    let mut pdf = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.5\n");
    let objstm_at = pdf.len();
    pdf.extend_from_slice(
        format!(
            "5 0 obj << /Type /ObjStm /N 2 /First {} /Length {} >> stream\n",
            header.len(),
            objstm_data.len()
        )
        .as_bytes(),
    );
    pdf.extend_from_slice(&objstm_data);
    pdf.extend_from_slice(b"\nendstream endobj\n");
    let page_at = pdf.len();
    pdf.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] >> endobj\n");

    // Xref stream: entries for 0..6, W [1 2 1]
    let entries: Vec<[u8; 4]> = vec![
        [0, 0, 0, 255],                      // 0 free
        [2, 0, 5, 0],                        // 1 in objstm 5, index 0
        [2, 0, 5, 1],                        // 2 in objstm 5, index 1
        [1, 0, page_at as u8, 0],            // 3 at offset (fits one byte here)
        [0, 0, 0, 0],                        // 4 free
        [1, 0, objstm_at as u8, 0],          // 5 at offset
    ];
    assert!(page_at < 256 && objstm_at < 256, "offsets must fit the 1-byte field");
    let body: Vec<u8> = entries.concat();
    let xref_at = pdf.len();
    pdf.extend_from_slice(
        format!(
            "6 0 obj << /Type /XRef /Size 6 /W [1 2 1] /Root 1 0 R /Length {} >> stream\n",
            body.len()
        )
        .as_bytes(),
    );
    pdf.extend_from_slice(&body);
    pdf.extend_from_slice(b"\nendstream endobj\n");
    pdf.extend_from_slice(format!("startxref\n{xref_at}\n%%EOF").as_bytes());

    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    assert_eq!(doc.page_count().unwrap(), 1);
    let page = doc.page(0).unwrap();
    assert_eq!(page.media_box.width(), 10.0);
}

#[test]
fn test_open_from_disk() {
    use std::io::Write;
    let pdf = one_page_pdf("0 0 30 30", "", "0 g 0 0 30 30 re f");
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&pdf).unwrap();
    file.flush().unwrap();

    let mut doc = Document::open(file.path()).unwrap();
    assert_eq!(doc.page_count().unwrap(), 1);
    let pm = render_page(&mut doc, 0, &RenderOptions::default()).unwrap();
    assert_eq!(pm.pixel(15, 15), Some(&[0u8, 0, 0, 255][..]));
}

#[test]
fn test_missing_mediabox_defaults_to_letter() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    b.object(3, "<< /Type /Page /Parent 2 0 R >>");
    let mut doc = Document::from_bytes(Bytes::from(b.build(1))).unwrap();
    let page = doc.page(0).unwrap();
    assert_eq!(page.media_box.width(), 612.0);
    assert_eq!(page.media_box.height(), 792.0);
}

#[test]
fn test_trailer_info_accessible() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    b.object(7, "<< /Producer (pdf_raster test) >>");
    let pdf = b.build_with_trailer(1, "/Info 7 0 R");
    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    let info = doc.trailer().get("Info").cloned().unwrap();
    let info = doc.resolve(&info).unwrap();
    assert_eq!(
        info.as_dict().unwrap().get("Producer").and_then(Object::as_string),
        Some(&b"pdf_raster test"[..])
    );
}

#[test]
fn test_free_entry_loads_as_null() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    // Object 5 never defined: the builder writes a free entry for it
    b.object(6, "(live)");
    let mut doc = Document::from_bytes(Bytes::from(b.build(1))).unwrap();
    assert!(doc.load_object(ObjRef::new(5, 0)).unwrap().is_null());
    assert_eq!(
        doc.load_object(ObjRef::new(6, 0)).unwrap().as_string(),
        Some(&b"live"[..])
    );
}

#[test]
fn test_page_inherits_resources_from_ancestor() {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(
        2,
        "<< /Type /Pages /Kids [3 0 R] /Count 1 \
         /Resources << /Font << /F9 9 0 R >> >> /MediaBox [0 0 20 20] >>",
    );
    b.object(3, "<< /Type /Page /Parent 2 0 R >>");
    b.object(9, "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>");
    let mut doc = Document::from_bytes(Bytes::from(b.build(1))).unwrap();
    let page = doc.page(0).unwrap();
    assert!(page.resources.get_dict("Font").is_some());
}
