//! Checks applied to an upload before it is queued for processing.
//!
//! The extension and content type are checked at registration. Once the
//! object is in the bucket, its first bytes must carry the container
//! signature matching the type implied by the file name.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::infrastructure::storage::object_store::{ObjectStore, StorageError};

/// Bytes fetched from the start of an upload for the signature check.
pub const HEADER_LEN: usize = 1024;
/// Shorter heads are rejected outright.
const MIN_HEADER_LEN: usize = 32;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "mov", "avi", "mkv", "flv", "3gp", "m4v", "wmv", "mpg", "mpeg",
];

pub const VIDEO_CONTENT_TYPES: &[&str] = &[
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "video/x-flv",
    "video/3gpp",
    "video/x-m4v",
    "video/x-ms-wmv",
    "video/mpeg",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Invalid file extension: {extension} (allowed: {})", VIDEO_EXTENSIONS.join(", "))]
    InvalidExtension { extension: String },

    #[error("Invalid content type: {content_type} (allowed: {})", VIDEO_CONTENT_TYPES.join(", "))]
    InvalidContentType { content_type: String },

    #[error("File too small to validate: {size} bytes")]
    TooShort { size: usize },

    #[error("Invalid file format. Expected {expected}, but file appears to be {detected}")]
    SignatureMismatch { expected: String, detected: String },
}

struct Signature {
    offset: usize,
    bytes: &'static [u8],
}

const FTYP: &[Signature] = &[Signature { offset: 4, bytes: b"ftyp" }];
const EBML: &[Signature] = &[Signature { offset: 0, bytes: &[0x1A, 0x45, 0xDF, 0xA3] }];
const RIFF_AVI: &[Signature] = &[
    Signature { offset: 0, bytes: b"RIFF" },
    Signature { offset: 8, bytes: b"AVI " },
];

/// Containers with a known signature. All entries of a row must match.
const CONTAINERS: &[(&str, &[Signature])] = &[
    ("video/mp4", FTYP),
    ("video/quicktime", FTYP),
    ("video/webm", EBML),
    ("video/x-msvideo", RIFF_AVI),
    ("video/x-matroska", EBML),
];

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn validate_extension(file_name: &str) -> Result<(), UploadError> {
    let extension = extension_of(file_name).unwrap_or_default();
    if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(UploadError::InvalidExtension { extension })
    }
}

pub fn validate_content_type(content_type: &str) -> Result<(), UploadError> {
    let normalized = content_type.trim().to_ascii_lowercase();
    if VIDEO_CONTENT_TYPES.contains(&normalized.as_str()) {
        Ok(())
    } else {
        Err(UploadError::InvalidContentType {
            content_type: content_type.to_string(),
        })
    }
}

/// The container type the file name implies. Unknown extensions are read
/// as mp4.
pub fn declared_container(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "video/mp4",
    }
}

fn matches(header: &[u8], signatures: &[Signature]) -> bool {
    signatures.iter().all(|sig| {
        header
            .get(sig.offset..sig.offset + sig.bytes.len())
            .is_some_and(|window| window == sig.bytes)
    })
}

/// First known container whose signature the header carries.
pub fn detect_container(header: &[u8]) -> Option<&'static str> {
    CONTAINERS
        .iter()
        .find(|(_, signatures)| matches(header, signatures))
        .map(|(container, _)| *container)
}

pub fn check_signature(header: &[u8], declared: &str) -> Result<(), UploadError> {
    if header.len() < MIN_HEADER_LEN {
        return Err(UploadError::TooShort { size: header.len() });
    }

    let valid = CONTAINERS
        .iter()
        .find(|(container, _)| *container == declared)
        .is_some_and(|(_, signatures)| matches(header, signatures));

    if valid {
        return Ok(());
    }

    Err(UploadError::SignatureMismatch {
        expected: declared.to_string(),
        detected: detect_container(header).unwrap_or("unknown format").to_string(),
    })
}

/// Reads the head of an uploaded object and checks its signature. The outer
/// error is a storage failure, the inner one a rejected upload.
pub async fn verify_upload(
    store: &dyn ObjectStore,
    object_name: &str,
    file_name: &str,
) -> Result<Result<(), UploadError>, StorageError> {
    let header = store.read_head(object_name, HEADER_LEN).await?;
    let declared = declared_container(file_name);
    debug!(object = object_name, declared, bytes = header.len(), "Checking upload signature");
    Ok(check_signature(&header, declared))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    fn padded(prefix: &[u8]) -> Vec<u8> {
        let mut header = prefix.to_vec();
        header.resize(64, 0);
        header
    }

    fn mp4_header() -> Vec<u8> {
        padded(&[0x00, 0x00, 0x00, 0x20, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm'])
    }

    fn ebml_header() -> Vec<u8> {
        padded(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81])
    }

    fn avi_header() -> Vec<u8> {
        padded(b"RIFF\x24\x00\x00\x00AVI LIST")
    }

    #[test]
    fn ftyp_box_passes_for_mp4_and_quicktime() {
        assert_eq!(check_signature(&mp4_header(), "video/mp4"), Ok(()));
        assert_eq!(check_signature(&mp4_header(), "video/quicktime"), Ok(()));
    }

    #[test]
    fn ebml_header_passes_for_webm_and_matroska() {
        assert_eq!(check_signature(&ebml_header(), "video/webm"), Ok(()));
        assert_eq!(check_signature(&ebml_header(), "video/x-matroska"), Ok(()));
    }

    #[test]
    fn avi_needs_both_riff_and_avi_markers() {
        assert_eq!(check_signature(&avi_header(), "video/x-msvideo"), Ok(()));

        let wave = padded(b"RIFF\x24\x00\x00\x00WAVEfmt ");
        assert_eq!(
            check_signature(&wave, "video/x-msvideo"),
            Err(UploadError::SignatureMismatch {
                expected: "video/x-msvideo".into(),
                detected: "unknown format".into(),
            })
        );
    }

    #[test]
    fn mismatched_container_names_what_was_found() {
        let err = check_signature(&ebml_header(), "video/mp4").unwrap_err();
        assert_eq!(
            err,
            UploadError::SignatureMismatch {
                expected: "video/mp4".into(),
                detected: "video/webm".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Invalid file format. Expected video/mp4, but file appears to be video/webm"
        );
    }

    #[test]
    fn short_or_unknown_heads_are_rejected() {
        assert_eq!(
            check_signature(&mp4_header()[..16], "video/mp4"),
            Err(UploadError::TooShort { size: 16 })
        );
        assert!(matches!(
            check_signature(&padded(b"%PDF-1.7"), "video/mp4"),
            Err(UploadError::SignatureMismatch { .. })
        ));
        // No signature is known for flv, so it cannot pass the check.
        assert!(check_signature(&mp4_header(), "video/x-flv").is_err());
    }

    #[test]
    fn declared_container_follows_the_extension() {
        assert_eq!(declared_container("clip.MOV"), "video/quicktime");
        assert_eq!(declared_container("clip.mkv"), "video/x-matroska");
        assert_eq!(declared_container("clip.webm"), "video/webm");
        assert_eq!(declared_container("clip.avi"), "video/x-msvideo");
        assert_eq!(declared_container("clip.m4v"), "video/mp4");
        assert_eq!(declared_container("clip"), "video/mp4");
    }

    #[test]
    fn registration_checks_extension_and_content_type() {
        assert!(validate_extension("holiday.MP4").is_ok());
        assert_eq!(
            validate_extension("notes.txt"),
            Err(UploadError::InvalidExtension { extension: "txt".into() })
        );
        assert!(validate_extension("no-extension").is_err());

        assert!(validate_content_type("video/quicktime").is_ok());
        assert!(validate_content_type("application/pdf").is_err());
    }

    struct HeadStore(Vec<u8>);

    #[async_trait]
    impl ObjectStore for HeadStore {
        async fn download(&self, _key: &str, _destination: &Path) -> Result<(), StorageError> {
            unreachable!("only the head is read")
        }

        async fn upload(&self, _source: &Path, _key: &str) -> Result<(), StorageError> {
            unreachable!("only the head is read")
        }

        async fn read_head(&self, key: &str, len: usize) -> Result<Vec<u8>, StorageError> {
            if self.0.is_empty() {
                return Err(StorageError::Download {
                    key: key.to_string(),
                    message: "NoSuchKey".into(),
                });
            }
            assert_eq!(len, HEADER_LEN);
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn verify_upload_reads_the_head_and_checks_it() {
        let store = HeadStore(mp4_header());
        assert_eq!(verify_upload(&store, "videos/a.mp4", "a.mp4").await.unwrap(), Ok(()));

        let rejected = verify_upload(&store, "videos/a.webm", "a.webm").await.unwrap();
        assert!(matches!(rejected, Err(UploadError::SignatureMismatch { .. })));

        let missing = HeadStore(Vec::new());
        assert!(verify_upload(&missing, "videos/a.mp4", "a.mp4").await.is_err());
    }
}
