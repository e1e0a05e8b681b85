//! Image upload rules: accepted types, size ceiling and object key layout.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::validation::FieldErrors;

pub const KEY_PREFIX: &str = "pr_images";

const ALLOWED_TYPES: [(&str, &str); 4] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// An image accepted for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub content_type: String,
    pub extension: String,
    pub size: usize,
}

/// Check type and size before anything leaves the process.
pub fn check_image(
    content_type: Option<&str>,
    filename: Option<&str>,
    size: usize,
    max_bytes: usize,
) -> Result<ImageUpload, FieldErrors> {
    // Parameters such as "; charset=" are not part of the media type.
    let content_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let Some((_, default_ext)) = ALLOWED_TYPES.iter().find(|(ct, _)| *ct == content_type) else {
        return Err(FieldErrors::single(
            "file",
            "Invalid file type. Allowed types: image/jpeg, image/png, image/gif, image/webp",
        ));
    };

    if size == 0 {
        return Err(FieldErrors::single("file", "file is empty"));
    }
    if size > max_bytes {
        return Err(FieldErrors::single(
            "file",
            format!("File too large. Maximum size is {}MB", max_bytes / (1024 * 1024)),
        ));
    }

    Ok(ImageUpload {
        content_type,
        extension: extension_for(filename).unwrap_or_else(|| default_ext.to_string()),
        size,
    })
}

fn extension_for(filename: Option<&str>) -> Option<String> {
    let (_, ext) = filename?.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())).then_some(ext)
}

/// `pr_images/{YYYYmmdd_HHMMSS}_{8 hex}.{ext}`
pub fn object_key(extension: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}_{}.{}",
        KEY_PREFIX,
        now.format("%Y%m%d_%H%M%S"),
        &suffix[..8],
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MAX: usize = 10 * 1024 * 1024;

    #[test]
    fn accepts_known_image_types() {
        let upload = check_image(Some("image/png"), Some("Banner.PNG"), 1024, MAX).unwrap();
        assert_eq!(upload.extension, "png");
        assert_eq!(upload.content_type, "image/png");

        let upload = check_image(Some("image/webp"), None, 1024, MAX).unwrap();
        assert_eq!(upload.extension, "webp");

        let upload = check_image(Some("image/jpeg"), Some("no-extension"), 1024, MAX).unwrap();
        assert_eq!(upload.extension, "jpg");
    }

    #[test]
    fn rejects_other_types() {
        for ct in [Some("application/pdf"), Some("image/svg+xml"), None] {
            let errors = check_image(ct, Some("x.png"), 10, MAX).unwrap_err();
            assert!(errors.contains("file"));
        }
    }

    #[test]
    fn rejects_oversize_and_empty_files() {
        assert!(check_image(Some("image/gif"), None, MAX, MAX).is_ok());
        let errors = check_image(Some("image/gif"), None, MAX + 1, MAX).unwrap_err();
        assert!(errors.get("file").unwrap().contains("10MB"));
        assert!(check_image(Some("image/gif"), None, 0, MAX).is_err());
    }

    #[test]
    fn key_layout() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let key = object_key("png", now);
        assert!(key.starts_with("pr_images/20240305_070809_"));
        assert!(key.ends_with(".png"));

        let random = &key["pr_images/20240305_070809_".len()..key.len() - ".png".len()];
        assert_eq!(random.len(), 8);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
