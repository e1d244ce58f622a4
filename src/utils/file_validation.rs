//! Upload checks: the real file type comes from the leading bytes, never from
//! the client's extension or MIME header.

use crate::message::AppError;

const MB: usize = 1024 * 1024;

/// Hard ceiling for any upload, enforced while the body is streamed in.
pub const MAX_UPLOAD_SIZE: usize = 10 * MB;

const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, PartialEq, Eq)]
pub struct FileSignature {
    pub mime_type: &'static str,
    pub magic: &'static [u8],
    pub max_size: usize,
}

/// Checked in order; the first matching prefix wins.
pub const SIGNATURES: &[FileSignature] = &[
    FileSignature {
        mime_type: "application/pdf",
        magic: &[0x25, 0x50, 0x44, 0x46],
        max_size: 10 * MB,
    },
    FileSignature {
        mime_type: "image/jpeg",
        magic: &[0xFF, 0xD8, 0xFF],
        max_size: 5 * MB,
    },
    FileSignature {
        mime_type: "image/png",
        magic: &[0x89, 0x50, 0x4E, 0x47],
        max_size: 5 * MB,
    },
    // DOCX is a ZIP container.
    FileSignature {
        mime_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        magic: &[0x50, 0x4B, 0x03, 0x04],
        max_size: 10 * MB,
    },
    FileSignature {
        mime_type: "application/msword",
        magic: &[0xD0, 0xCF, 0x11, 0xE0],
        max_size: 10 * MB,
    },
];

pub fn sniff(bytes: &[u8]) -> Option<&'static FileSignature> {
    SIGNATURES.iter().find(|sig| bytes.starts_with(sig.magic))
}

/// Returns the detected signature or the error to send back.
pub fn validate_upload(bytes: &[u8]) -> Result<&'static FileSignature, AppError> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    }

    let signature = sniff(bytes).ok_or_else(|| {
        AppError::BadRequest("Invalid file type. Allowed types: PDF, DOC, DOCX, JPG, PNG".to_string())
    })?;

    if bytes.len() > signature.max_size {
        return Err(AppError::BadRequest(format!(
            "File size exceeds limit of {}MB",
            signature.max_size / MB
        )));
    }

    Ok(signature)
}

/// Strips path separators, traversal sequences and characters that are
/// invalid in file names on common platforms.
pub fn sanitize_filename(filename: &str) -> String {
    let without_separators: String = filename.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    let without_traversal = without_separators.replace("..", "");
    let cleaned: String = without_traversal
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') && (*c as u32) >= 0x20)
        .collect();
    let sanitized = cleaned.trim_start_matches('.').trim();

    if sanitized.is_empty() {
        return "unnamed".to_string();
    }

    if sanitized.chars().count() <= MAX_FILENAME_LEN {
        return sanitized.to_string();
    }

    let ext = extension(sanitized);
    let stem = &sanitized[..sanitized.len() - ext.len()];
    let keep = MAX_FILENAME_LEN.saturating_sub(ext.chars().count());
    let truncated: String = stem.chars().take(keep).collect();
    format!("{truncated}{ext}")
}

/// The extension including its dot (`".pdf"`), or an empty string.
pub fn extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &filename[idx..],
    }
}
