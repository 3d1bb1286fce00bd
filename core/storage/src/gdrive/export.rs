//! Export formats for Workspace-native documents.

use bucketbridge_common::{Error, FileRef, Result};

const PDF: &str = "application/pdf";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Native type to export target.
pub const EXPORT_FORMATS: [(&str, &str); 4] = [
    ("application/vnd.google-apps.document", PDF),
    ("application/vnd.google-apps.spreadsheet", XLSX),
    ("application/vnd.google-apps.presentation", PDF),
    ("application/vnd.google-apps.drawing", PDF),
];

/// Look up the export target for a native MIME type.
pub fn export_target(mime_type: &str) -> Option<&'static str> {
    EXPORT_FORMATS
        .iter()
        .find(|(native, _)| *native == mime_type)
        .map(|(_, target)| *target)
}

/// How a file's bytes leave Drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Export the native document as the given MIME type.
    Export(&'static str),
    /// Fetch the stored bytes unchanged.
    Raw,
}

/// Decide how to download `file`.
///
/// # Errors
/// - `UnsupportedType` for a native type missing from [`EXPORT_FORMATS`]
pub fn download_mode(file: &FileRef) -> Result<DownloadMode> {
    if !file.is_native() {
        return Ok(DownloadMode::Raw);
    }

    export_target(&file.mime_type)
        .map(DownloadMode::Export)
        .ok_or_else(|| {
            Error::UnsupportedType(format!(
                "Unsupported Google Workspace file type: {}",
                file.mime_type
            ))
        })
}

/// Content type of the bytes that a download of `file` yields.
pub fn exported_content_type(file: &FileRef) -> Result<String> {
    Ok(match download_mode(file)? {
        DownloadMode::Export(target) => target.to_string(),
        DownloadMode::Raw => file.mime_type.clone(),
    })
}
