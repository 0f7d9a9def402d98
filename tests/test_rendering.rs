//! End-to-end rendering scenarios through the draw device.

mod common;

use bytes::Bytes;
use common::one_page_pdf;
use pdf_raster::{Document, RenderOptions, render_page};

fn render(pdf: Vec<u8>, options: &RenderOptions<'_>) -> pdf_raster::Pixmap {
    common::init_logging();
    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    render_page(&mut doc, 0, options).unwrap()
}

#[test]
fn test_empty_page_renders_all_white() {
    let pdf = one_page_pdf("0 0 100 100", "", "");
    let pm = render(pdf, &RenderOptions::default());
    assert_eq!(pm.w, 100);
    assert_eq!(pm.h, 100);
    for px in pm.samples.chunks_exact(4) {
        assert_eq!(px, [0xFF, 0xFF, 0xFF, 0xFF]);
    }
}

#[test]
fn test_solid_red_fill() {
    let pdf = one_page_pdf("0 0 100 100", "", "1 0 0 rg 0 0 100 100 re f");
    let pm = render(pdf, &RenderOptions::default());
    assert_eq!((pm.w, pm.h), (100, 100));
    for px in pm.samples.chunks_exact(4) {
        assert_eq!(px, [0xFF, 0x00, 0x00, 0xFF]);
    }
}

#[test]
fn test_partial_fill_keeps_background() {
    // Lower-left quarter in device gray
    let pdf = one_page_pdf("0 0 100 100", "", "0 g 0 0 50 50 re f");
    let pm = render(pdf, &RenderOptions::default());
    // User-space (10,10) is near the bottom: device y = 89
    assert_eq!(pm.pixel(10, 89), Some(&[0u8, 0, 0, 255][..]));
    // Top half stays white
    assert_eq!(pm.pixel(10, 10), Some(&[255u8, 255, 255, 255][..]));
}

#[test]
fn test_render_is_deterministic() {
    let pdf = one_page_pdf(
        "0 0 80 80",
        "",
        "0.2 0.4 0.9 rg 5 5 70 40 re f 1 0 0 RG 4 w 10 50 m 70 60 l S",
    );
    let first = render(pdf.clone(), &RenderOptions::default());
    let second = render(pdf, &RenderOptions::default());
    assert_eq!(first.samples, second.samples);
}

#[test]
fn test_premultiplied_invariant_holds() {
    let pdf = one_page_pdf(
        "0 0 60 60",
        "",
        "q 0.5 0 0 0.5 10 10 cm 0 0 1 rg 0 0 60 60 re f Q 0 1 0 rg 20 20 20 20 re f",
    );
    let pm = render(pdf, &RenderOptions::default());
    assert!(pm.premultiplied_ok());
}

#[test]
fn test_dpi_scales_output() {
    let pdf = one_page_pdf("0 0 100 100", "", "");
    let options = RenderOptions {
        dpi: 144.0,
        ..Default::default()
    };
    let pm = render(pdf, &options);
    assert_eq!((pm.w, pm.h), (200, 200));
}

#[test]
fn test_clip_restricts_painting() {
    let content = "0 0 50 100 re W n 1 0 0 rg 0 0 100 100 re f";
    let pdf = one_page_pdf("0 0 100 100", "", content);
    let pm = render(pdf, &RenderOptions::default());
    assert_eq!(pm.pixel(10, 50), Some(&[255u8, 0, 0, 255][..]));
    assert_eq!(pm.pixel(80, 50), Some(&[255u8, 255, 255, 255][..]));
}

#[test]
fn test_q_restore_discards_clip() {
    let content = "q 0 0 10 10 re W n Q 1 0 0 rg 50 50 10 10 re f";
    let pdf = one_page_pdf("0 0 100 100", "", content);
    let pm = render(pdf, &RenderOptions::default());
    // The fill after Q is unclipped: user (55,55) -> device (55,44)
    assert_eq!(pm.pixel(55, 44), Some(&[255u8, 0, 0, 255][..]));
}

#[test]
fn test_alpha_blend_via_extgstate() {
    let content = "/GS0 gs 1 0 0 rg 0 0 100 100 re f";
    let mut b = common::PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    b.object(
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Contents 4 0 R \
         /Resources << /ExtGState << /GS0 5 0 R >> >> >>",
    );
    b.stream(4, "", content.as_bytes());
    b.object(5, "<< /Type /ExtGState /ca 0.5 >>");
    let pm = render(b.build(1), &RenderOptions::default());
    let px = pm.pixel(50, 50).unwrap();
    // 50% red over white: full red, green/blue near half
    assert_eq!(px[0], 255);
    assert!((115..=140).contains(&px[1]), "{px:?}");
    assert_eq!(px[3], 255);
}

#[test]
fn test_rotated_page_swaps_dimensions() {
    let pdf = one_page_pdf("0 0 100 50", "/Rotate 90", "");
    let pm = render(pdf, &RenderOptions::default());
    assert_eq!((pm.w, pm.h), (50, 100));
}

#[test]
fn test_type3_glyph_replays_charproc() {
    let mut b = common::PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    b.object(
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Contents 4 0 R \
         /Resources << /Font << /F3 5 0 R >> >> >>",
    );
    b.stream(4, "", b"BT /F3 10 Tf 10 10 Td (A) Tj ET");
    b.object(
        5,
        "<< /Type /Font /Subtype /Type3 /FontBBox [0 0 10 10] \
         /FontMatrix [0.1 0 0 0.1 0 0] \
         /CharProcs << /square 7 0 R >> \
         /Encoding << /Type /Encoding /Differences [65 /square] >> \
         /FirstChar 65 /LastChar 65 /Widths [10] >>",
    );
    b.stream(7, "", b"10 0 0 0 10 10 d1 0 0 10 10 re f");

    let pm = render(b.build(1), &RenderOptions::default());
    // The glyph square covers user (10,10)-(20,20): device rows 80..90
    assert_eq!(pm.pixel(15, 85), Some(&[0u8, 0, 0, 255][..]));
    assert_eq!(pm.pixel(35, 85), Some(&[255u8, 255, 255, 255][..]));
}

#[test]
fn test_abort_cookie_cancels_render() {
    use pdf_raster::Cookie;
    let pdf = one_page_pdf("0 0 100 100", "", "1 0 0 rg 0 0 100 100 re f");
    let mut doc = Document::from_bytes(Bytes::from(pdf)).unwrap();
    let cookie = Cookie::new();
    cookie.set_abort();
    let options = RenderOptions {
        cookie: Some(&cookie),
        ..Default::default()
    };
    let err = render_page(&mut doc, 0, &options).unwrap_err();
    assert!(matches!(err, pdf_raster::Error::Abort));
}
