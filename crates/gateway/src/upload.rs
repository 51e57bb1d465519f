pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tif", "tiff"];

/// True when `filename` has an extension from [`ALLOWED_EXTENSIONS`], compared
/// case-insensitively on the text after the last dot.
pub fn allowed_file(filename: &str) -> bool {
    filename.rsplit_once('.').is_some_and(|(_, ext)| {
        ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

/// Reduce a client-supplied name to a flat, ASCII-only file name.
///
/// Path separators and whitespace become `_`, everything outside
/// `[A-Za-z0-9_.-]` is dropped, and leading or trailing dots and
/// underscores are stripped. The result may be empty.
pub fn secure_filename(filename: &str) -> String {
    let flattened = filename.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        assert!(allowed_file("reef.png"));
        assert!(allowed_file("REEF.JPG"));
        assert!(allowed_file("sample.v2.tiff"));
        assert!(allowed_file("scan.Tif"));

        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("png"));
        assert!(!allowed_file("archive.png.zip"));
        assert!(!allowed_file(""));
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My Sample.png"), "My_Sample.png");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("C:\\uploads\\net 01.jpg"), "C_uploads_net_01.jpg");
        assert_eq!(secure_filename("plancton_été.tif"), "plancton_t.tif");
        assert_eq!(secure_filename(".hidden.png"), "hidden.png");
        assert_eq!(secure_filename("../"), "");
    }
}
