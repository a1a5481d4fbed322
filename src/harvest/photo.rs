//! Which files count as camera-trap photos, and where they may be written.

use std::path::{Component, Path, PathBuf};

/// Accepted photo extensions, lowercase and without the leading dot.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Returns `true` if `filename` has a supported image extension
/// (case-insensitive).
pub fn is_supported_photo(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_IMAGE_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Resolves an attachment filename inside `root`.
///
/// Returns `None` for names that would land outside `root`: absolute paths,
/// `..` components, or anything that is not a single plain file name.
pub fn safe_child(root: &Path, filename: &str) -> Option<PathBuf> {
    let relative = Path::new(filename);
    let mut components = relative.components();

    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(root.join(relative)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported_photo() {
        assert!(is_supported_photo("photo.JPG"));
        assert!(is_supported_photo("IMG_0001.jpeg"));
        assert!(is_supported_photo("trail.tar.Png"));
        assert!(!is_supported_photo("notes.txt"));
        assert!(!is_supported_photo("jpg"));
        assert!(!is_supported_photo(".jpg"));
        assert!(!is_supported_photo("photo.jpg.exe"));
    }

    #[test]
    fn test_safe_child_rejects_path_traversal() {
        let root = Path::new("/srv/photos");

        assert!(safe_child(root, "../../etc/passwd.jpg").is_none());
        assert!(safe_child(root, "/etc/cron.d/x.jpg").is_none());
        assert!(safe_child(root, "sub/dir.jpg").is_none());
        assert!(safe_child(root, "").is_none());
        assert_eq!(
            safe_child(root, "IMG_0001.JPG"),
            Some(PathBuf::from("/srv/photos/IMG_0001.JPG"))
        );
    }
}
