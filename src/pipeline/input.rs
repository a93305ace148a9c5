//! Input validation: make sure the user-supplied path is a readable PDF.
//!
//! We check the `%PDF` magic bytes before anything else so callers get a
//! meaningful error rather than a pdfium parse failure on a JPEG or an HTML
//! error page saved with a `.pdf` extension.

use crate::error::Pdf2VideoError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path: it exists, is a file, is readable, and starts
/// with the PDF magic bytes.
pub fn resolve_input(path: &Path) -> Result<PathBuf, Pdf2VideoError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(Pdf2VideoError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                Ok(()) => return Err(Pdf2VideoError::NotAPdf { path, magic }),
                Err(_) => {
                    return Err(Pdf2VideoError::CorruptPdf {
                        path,
                        detail: "file is shorter than a PDF header".into(),
                    })
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2VideoError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2VideoError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_reported() {
        let err = resolve_input(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, Pdf2VideoError::FileNotFound { .. }));
    }

    #[test]
    fn directory_is_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input(dir.path()).unwrap_err();
        assert!(matches!(err, Pdf2VideoError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"\x89PNG\r\n").unwrap();
        let err = resolve_input(f.path()).unwrap_err();
        match err {
            Pdf2VideoError::NotAPdf { magic, .. } => assert_eq!(&magic, b"\x89PNG"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%P").unwrap();
        assert!(matches!(
            resolve_input(f.path()),
            Err(Pdf2VideoError::CorruptPdf { .. })
        ));
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_input(f.path()).unwrap(), f.path());
    }
}
