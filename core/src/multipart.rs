//! Hand-built `multipart/form-data` bodies.
//!
//! The gateway only accepts the exact part layout a 2012-era browser form
//! produced, so the body is assembled byte by byte instead of through a
//! client library's form builder.

use uuid::Uuid;

/// One part of a multipart body, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Field {
        name: String,
        value: String,
    },
    /// A file input. `filename: None` encodes "no file selected".
    File {
        name: String,
        filename: Option<String>,
        content_type: String,
        content: Vec<u8>,
    },
}

/// Twenty dashes followed by a random token.
pub fn new_boundary() -> String {
    format!("{}{}", "-".repeat(20), Uuid::new_v4().simple())
}

/// Encode `parts` with `boundary`. Every part is opened with `--boundary` and
/// the body ends with exactly one `--boundary--` terminator.
pub fn encode(parts: &[Part], boundary: &str) -> Vec<u8> {
    let mut out = Vec::new();

    for part in parts {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match part {
            Part::Field { name, value } => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                filename: None,
                ..
            } => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            Part::File {
                name,
                filename: Some(filename),
                content_type,
                content,
            } => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\
                         Content-Transfer-Encoding: binary\r\n\r\n"
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(content);
                out.extend_from_slice(b"\r\n");
            }
        }
    }

    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}

/// Guess a media type from leading magic bytes, then from the shape of text
/// content.
pub fn sniff_media_type(content: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"II*\0", "image/tiff"),
        (b"MM\0*", "image/tiff"),
        (b"\0\0\x01\0", "image/x-icon"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
        (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
        (b"Rar!\x1a\x07", "application/x-rar-compressed"),
        (b"ID3", "audio/mpeg"),
        (b"OggS", "audio/ogg"),
        (b"fLaC", "audio/flac"),
        (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", "application/x-ole-storage"),
    ];
    // RIFF containers name their format at offset 8.
    const RIFF: &[(&[u8], &str)] = &[
        (b"WEBP", "image/webp"),
        (b"WAVE", "audio/x-wav"),
        (b"AVI ", "video/x-msvideo"),
    ];

    if content.starts_with(b"RIFF") && content.len() >= 12 {
        if let Some((_, mime)) = RIFF.iter().find(|(tag, _)| &content[8..12] == *tag) {
            return *mime;
        }
    }
    if is_bmp(content) {
        return "image/bmp";
    }
    if content.len() >= 12 && &content[4..8] == b"ftyp" {
        return "video/mp4";
    }
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| content.starts_with(magic)) {
        return *mime;
    }
    if content.is_empty() {
        return "application/x-empty";
    }
    match std::str::from_utf8(content) {
        Ok(text) if !text.contains('\0') => sniff_text(text),
        _ => "application/octet-stream",
    }
}

/// `BM` alone is too common in text, so the DIB header size is checked too.
fn is_bmp(content: &[u8]) -> bool {
    if !content.starts_with(b"BM") || content.len() < 18 {
        return false;
    }
    let dib = u32::from_le_bytes([content[14], content[15], content[16], content[17]]);
    matches!(dib, 12 | 40 | 52 | 56 | 108 | 124)
}

fn sniff_text(text: &str) -> &'static str {
    let head: String = text
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(64)
        .collect::<String>()
        .to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        "text/html"
    } else if head.starts_with("<?xml") {
        "text/xml"
    } else {
        "text/plain"
    }
}
