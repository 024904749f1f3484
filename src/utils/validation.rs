use anyhow::{anyhow, Result};
use std::path::Path;

/// Maximum upload size: 10 MiB
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Only report formats are accepted
pub const ALLOWED_MIME_TYPES: &[&str] = &[PDF_MIME, DOCX_MIME];

/// Magic byte signatures for the accepted formats
const MAGIC_SIGNATURES: &[(&[u8], &str)] = &[
    (&[0x25, 0x50, 0x44, 0x46], PDF_MIME),  // %PDF
    (&[0x50, 0x4B, 0x03, 0x04], DOCX_MIME), // ZIP container (docx)
];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<()> {
    if size > max_size {
        return Err(anyhow!(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes ({} MB)",
                size,
                max_size,
                max_size / 1024 / 1024
            ),
        }));
    }
    Ok(())
}

/// Validates MIME type against the PDF/DOCX allowlist
pub fn validate_mime_type(content_type: &str) -> Result<()> {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if ALLOWED_MIME_TYPES
        .iter()
        .any(|&allowed| allowed == normalized)
    {
        return Ok(());
    }

    Err(anyhow!(ValidationError {
        code: "INVALID_MIME_TYPE",
        message: format!(
            "MIME type '{}' is not allowed. Only PDF and DOCX are supported.",
            content_type
        ),
    }))
}

/// Sanitizes filename to prevent path traversal and injection attacks
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        }));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    // Block path separators and reserved characters, keep the rest
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == '/'
                || c == '\\'
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        return Err(anyhow!(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        }));
    }

    Ok(sanitized)
}

/// Checks magic bytes to verify the content matches the claimed type
pub fn verify_magic_bytes(header: &[u8], claimed_mime: &str) -> Result<()> {
    if header.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "EMPTY_FILE",
            message: "File appears to be empty".to_string(),
        }));
    }

    for (signature, mime_type) in MAGIC_SIGNATURES {
        if header.len() >= signature.len()
            && header.starts_with(signature)
            && *mime_type == claimed_mime
        {
            return Ok(());
        }
    }

    Err(anyhow!(ValidationError {
        code: "CONTENT_TYPE_MISMATCH",
        message: format!(
            "File content does not match the declared type '{}'",
            claimed_mime
        ),
    }))
}

/// Full validation pipeline for uploaded report files
pub fn validate_upload(
    filename: &str,
    content_type: Option<&str>,
    size: usize,
    header: &[u8],
    max_size: usize,
) -> Result<String> {
    // 1. Size check
    validate_file_size(size, max_size)?;

    // 2. Sanitize filename
    let sanitized_filename = sanitize_filename(filename)?;

    // 3. MIME type check
    let mime = content_type.unwrap_or("application/octet-stream");
    validate_mime_type(mime)?;

    // 4. Magic bytes verification
    verify_magic_bytes(header, mime)?;

    Ok(sanitized_filename)
}
