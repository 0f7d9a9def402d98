//! Processor laws: buffer round-trip, filtering, display-list replay.

mod common;

use bytes::Bytes;
use common::one_page_pdf;
use pdf_raster::content::{BufferProcessor, RunProcessor, process_stream};
use pdf_raster::device::list::{ListDevice, ListItem};
use pdf_raster::object::Dict;
use pdf_raster::{Document, Matrix};

fn doc() -> Document {
    Document::from_bytes(Bytes::from(one_page_pdf("0 0 100 100", "", ""))).unwrap()
}

fn device_calls(doc: &mut Document, content: &[u8]) -> Vec<ListItem> {
    let mut device = ListDevice::new();
    {
        let mut rp = RunProcessor::new(doc, &mut device, Dict::new(), Matrix::IDENTITY, "View", None);
        rp.run(content).unwrap();
    }
    device.into_list().items
}

#[test]
fn test_buffer_then_run_matches_direct_run() {
    let content: &[u8] =
        b"q 0.5 0 0 0.5 10 20 cm 1 0 0 rg 0 0 100 100 re f 2 w 0 0 m 50 50 l S Q";

    let mut buffer = BufferProcessor::new();
    process_stream(content, &mut buffer, None, true).unwrap();
    let rewritten = buffer.into_bytes();

    let direct = device_calls(&mut doc(), content);
    let via_buffer = device_calls(&mut doc(), &rewritten);

    assert_eq!(direct.len(), via_buffer.len());
    for (a, b) in direct.iter().zip(&via_buffer) {
        match (a, b) {
            (ListItem::FillPath(p1, eo1, m1, c1), ListItem::FillPath(p2, eo2, m2, c2)) => {
                assert_eq!(p1, p2);
                assert_eq!(eo1, eo2);
                assert_eq!(m1, m2);
                assert_eq!(c1, c2);
            },
            (ListItem::StrokePath(p1, s1, m1, c1), ListItem::StrokePath(p2, s2, m2, c2)) => {
                assert_eq!(p1, p2);
                assert_eq!(s1, s2);
                assert_eq!(m1, m2);
                assert_eq!(c1, c2);
            },
            (a, b) => assert_eq!(
                std::mem::discriminant(a),
                std::mem::discriminant(b),
                "{a:?} vs {b:?}"
            ),
        }
    }
}

#[test]
fn test_display_list_replay_reproduces_render() {
    use pdf_raster::device::draw::DrawDevice;
    use pdf_raster::geometry::IRect;

    let content: &[u8] = b"0 0 1 rg 5 5 20 20 re f 1 0 0 RG 3 w 0 30 m 30 0 l S";
    let mut doc = doc();

    // Record once
    let list = {
        let mut recorder = ListDevice::new();
        {
            let mut rp = RunProcessor::new(
                &mut doc,
                &mut recorder,
                Dict::new(),
                Matrix::IDENTITY,
                "View",
                None,
            );
            rp.run(content).unwrap();
        }
        recorder.into_list()
    };

    // Direct render
    let direct = {
        let mut device = DrawDevice::new(IRect::new(0, 0, 40, 40), 8);
        device.clear_white();
        {
            let mut rp = RunProcessor::new(
                &mut doc,
                &mut device,
                Dict::new(),
                Matrix::IDENTITY,
                "View",
                None,
            );
            rp.run(content).unwrap();
        }
        device.into_pixmap()
    };

    // Replayed render
    let replayed = {
        let mut device = DrawDevice::new(IRect::new(0, 0, 40, 40), 8);
        device.clear_white();
        list.replay(&mut device).unwrap();
        device.into_pixmap()
    };

    assert_eq!(direct.samples, replayed.samples);
}

#[test]
fn test_filter_processor_strips_text() {
    use pdf_raster::content::{FilterProcessor, Op};

    let content: &[u8] = b"0 0 5 5 re f BT ET 10 10 5 5 re f";
    let mut buffer = BufferProcessor::new();
    {
        let mut filter = FilterProcessor::new(&mut buffer, |op| {
            !matches!(op, Op::BeginText | Op::EndText)
        });
        process_stream(content, &mut filter, None, true).unwrap();
    }
    let rewritten = String::from_utf8(buffer.into_bytes()).unwrap();
    assert!(!rewritten.contains("BT"));
    assert!(rewritten.matches("re").count() == 2);
}
