//! Shared helpers: build small PDF files in memory for end-to-end tests.

/// Opt-in logging for test debugging (`RUST_LOG=debug cargo test ...`).
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assembles a PDF from numbered objects, writing a classic xref table.
pub struct PdfBuilder {
    objects: Vec<(u32, Vec<u8>)>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Add an object with a direct body (no stream).
    pub fn object(&mut self, num: u32, body: &str) -> &mut Self {
        self.objects.push((num, body.as_bytes().to_vec()));
        self
    }

    /// Add a stream object; `dict_entries` go inside `<< ... >>` and the
    /// /Length entry is appended automatically.
    pub fn stream(&mut self, num: u32, dict_entries: &str, data: &[u8]) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!("<< {dict_entries} /Length {} >>\nstream\n", data.len()).as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.push((num, body));
        self
    }

    /// Serialize with a classic xref table and the given trailer extras.
    pub fn build_with_trailer(&self, root: u32, trailer_extra: &str) -> Vec<u8> {
        let mut pdf = Vec::new();
        pdf.extend_from_slice(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n");

        let max_num = self.objects.iter().map(|(n, _)| *n).max().unwrap_or(0);
        let mut offsets = vec![None; max_num as usize + 1];
        for (num, body) in &self.objects {
            offsets[*num as usize] = Some(pdf.len());
            pdf.extend_from_slice(format!("{num} 0 obj\n").as_bytes());
            pdf.extend_from_slice(body);
            pdf.extend_from_slice(b"\nendobj\n");
        }

        let xref_at = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n", max_num + 1).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets.iter().skip(1) {
            match offset {
                Some(at) => pdf.extend_from_slice(format!("{at:010} 00000 n \n").as_bytes()),
                None => pdf.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }
        pdf.extend_from_slice(
            format!(
                "trailer << /Size {} /Root {root} 0 R {trailer_extra} >>\nstartxref\n{xref_at}\n%%EOF",
                max_num + 1
            )
            .as_bytes(),
        );
        pdf
    }

    pub fn build(&self, root: u32) -> Vec<u8> {
        self.build_with_trailer(root, "")
    }
}

/// A one-page document: catalog(1) -> pages(2) -> page(3) -> contents(4),
/// with `page_extra` spliced into the page dictionary.
pub fn one_page_pdf(media_box: &str, page_extra: &str, content: &str) -> Vec<u8> {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    b.object(
        3,
        &format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [{media_box}] /Contents 4 0 R {page_extra} >>"
        ),
    );
    b.stream(4, "", content.as_bytes());
    b.build(1)
}
