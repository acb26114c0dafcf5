//! Upload safety checks for media.
//!
//! Uploads are rejected when they exceed the size limit, carry a blocked
//! extension, or start with an executable magic number. The stored content
//! type comes from the bytes, not from what the client claimed.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::defaults::FILENAME_MAX_LENGTH;

/// Magic byte signatures for executable formats.
const EXECUTABLE_SIGNATURES: &[(&str, &[u8])] = &[
    ("Windows PE", &[0x4D, 0x5A]),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46]),
    ("Mach-O 32", &[0xFE, 0xED, 0xFA, 0xCE]),
    ("Mach-O 64", &[0xFE, 0xED, 0xFA, 0xCF]),
    ("Mach-O universal or Java class", &[0xCA, 0xFE, 0xBA, 0xBE]),
    ("WebAssembly", &[0x00, 0x61, 0x73, 0x6D]),
];

static BLOCKED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "scr", "pif", "com", "msi", "bat", "cmd", "ps1", "so", "dylib", "jar",
        "class", "deb", "rpm", "apk", "dmg", "pkg", "lnk", "hta", "docm", "xlsm", "pptm",
    ]
    .into_iter()
    .collect()
});

/// Outcome of [`validate_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub allowed: bool,
    pub block_reason: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            block_reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            block_reason: Some(reason.into()),
        }
    }
}

/// Check an upload before it reaches storage.
pub fn validate_file(filename: &str, data: &[u8], max_size_bytes: usize) -> ValidationResult {
    if data.is_empty() {
        return ValidationResult::blocked("File is empty");
    }
    if data.len() > max_size_bytes {
        return ValidationResult::blocked(format!(
            "File exceeds maximum size of {} bytes",
            max_size_bytes
        ));
    }

    if let Some((_, ext)) = filename.rsplit_once('.') {
        if BLOCKED_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()) {
            tracing::warn!(subsystem = "storage", filename, ext, "Upload blocked by extension");
            return ValidationResult::blocked(format!("File extension .{} is not allowed", ext));
        }
    }

    for (name, magic) in EXECUTABLE_SIGNATURES {
        if data.starts_with(magic) {
            tracing::warn!(subsystem = "storage", filename, kind = *name, "Upload blocked: executable content");
            return ValidationResult::blocked(format!("Executable content detected: {}", name));
        }
    }

    ValidationResult::allowed()
}

/// Detect the content type from magic bytes, then the extension for text
/// formats, then the claimed type when it is text-like.
pub fn detect_content_type(filename: &str, data: &[u8], claimed: &str) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    if let Some((_, ext)) = filename.rsplit_once('.') {
        if let Some(mime) = text_mime_from_extension(ext) {
            return mime.to_string();
        }
    }

    // A binary claim without matching magic bytes is not trusted.
    tracing::debug!(filename, claimed, "No magic bytes matched, checking claimed type");
    if claimed.starts_with("image/")
        || claimed.starts_with("audio/")
        || claimed.starts_with("video/")
        || claimed == "application/pdf"
        || claimed.is_empty()
    {
        return "application/octet-stream".to_string();
    }
    claimed.to_string()
}

fn text_mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "md" | "markdown" => Some("text/markdown"),
        "html" | "htm" => Some("text/html"),
        "json" => Some("application/json"),
        "xml" => Some("application/xml"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Strip path components and control characters from a client filename.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return "unnamed_file".to_string();
    }

    if sanitized.chars().count() > FILENAME_MAX_LENGTH {
        let ext: String = match sanitized.rsplit_once('.') {
            Some((_, e)) if e.chars().count() < 16 => format!(".{}", e),
            _ => String::new(),
        };
        let stem: String = sanitized
            .chars()
            .take(FILENAME_MAX_LENGTH - ext.chars().count())
            .collect();
        return format!("{}{}", stem, ext);
    }

    sanitized.to_string()
}
