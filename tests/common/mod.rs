//! Shared fixtures for integration tests.

#![allow(dead_code)]

/// Minimal single-page PDF showing `lines` in Helvetica, one per text line.
///
/// Body first, then an xref with exact byte offsets so pdf-extract and lopdf
/// can both parse it.
pub fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT /F1 10 Tf 72 760 Td\n");
    for line in lines {
        content.push_str(&format!("({}) Tj 0 -14 Td\n", escape(line)));
    }
    content.push_str("ET");

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn escape(line: &str) -> String {
    line.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// A PDF with comfortably more than the default minimum of extractable text.
pub fn paper_pdf(topic: &str) -> Vec<u8> {
    let lines = [
        format!("A Study of {}", topic),
        "Ada Lovelace and Alan Turing".to_string(),
        format!("We investigate {} on a range of benchmark tasks.", topic),
        "Our method improves accuracy while reducing the number of parameters.".to_string(),
        "Experiments show consistent gains across all evaluated settings.".to_string(),
    ];
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    pdf_with_lines(&refs)
}

/// A PDF whose text is far below the default minimum.
pub fn short_pdf() -> Vec<u8> {
    pdf_with_lines(&["Tiny"])
}
