use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

use super::types::{ScanType, ScanUpload};
use crate::error::AnalysisError;

/// Local, synchronous check on a selected scan. Only image uploads go further.
pub fn validate_upload(upload: &ScanUpload) -> std::result::Result<(), AnalysisError> {
    let mime = upload.mime_type.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") || mime.len() == "image/".len() {
        return Err(AnalysisError::Validation(format!(
            "'{}' is not an image (got {})",
            upload.file_name,
            if upload.mime_type.is_empty() { "unknown type" } else { upload.mime_type.as_str() }
        )));
    }
    if upload.data.is_empty() {
        return Err(AnalysisError::Validation(format!("'{}' is empty", upload.file_name)));
    }
    Ok(())
}

/// Declared mime type for raw bytes: magic bytes first, then the file extension.
pub fn sniff_mime_type(data: &[u8], path: &Path) -> String {
    if let Some(kind) = infer::get(data) {
        debug!("Detected {} from file contents", kind.mime_type());
        return kind.mime_type().to_string();
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        "dcm" => "application/dicom",
        _ => "application/octet-stream",
    }
    .to_string()
}

impl ScanUpload {
    /// Reads a scan from disk. The result still has to pass [`validate_upload`].
    pub fn from_path(path: &Path, scan_type: ScanType) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read scan file {}", path.display()))?;
        let mime_type = sniff_mime_type(&data, path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scan".to_string());
        Ok(ScanUpload::new(file_name, mime_type, scan_type, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn rejects_pdf_and_accepts_png() {
        let pdf = ScanUpload::new("report.pdf", "application/pdf", ScanType::Mri, b"%PDF-1.4".to_vec());
        assert!(matches!(validate_upload(&pdf), Err(AnalysisError::Validation(_))));

        let png = ScanUpload::new("axial.png", "image/png", ScanType::Mri, PNG_HEADER.to_vec());
        assert!(validate_upload(&png).is_ok());
    }

    #[test]
    fn rejects_empty_and_bare_types() {
        let bare = ScanUpload::new("x", "image/", ScanType::Ct, PNG_HEADER.to_vec());
        assert!(validate_upload(&bare).is_err());

        let empty = ScanUpload::new("x.png", "image/png", ScanType::Ct, Vec::new());
        assert!(validate_upload(&empty).is_err());
    }

    #[test]
    fn sniffs_magic_bytes_before_extension() {
        assert_eq!(sniff_mime_type(PNG_HEADER, Path::new("scan.jpg")), "image/png");
        assert_eq!(sniff_mime_type(b"plain text", Path::new("scan.JPEG")), "image/jpeg");
        assert_eq!(sniff_mime_type(b"plain text", Path::new("notes")), "application/octet-stream");
    }

    #[test]
    fn reads_upload_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(PNG_HEADER).unwrap();

        let upload = ScanUpload::from_path(file.path(), ScanType::Pet).unwrap();
        assert_eq!(upload.mime_type, "image/png");
        assert_eq!(upload.scan_type, ScanType::Pet);
        assert!(upload.file_name.ends_with(".png"));
        assert!(validate_upload(&upload).is_ok());
    }
}
