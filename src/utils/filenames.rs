//! Filename parsing rules for the media pipeline
//!
//! Incoming files are named `NUMBER.ext` or `NUMBER_VIEW.ext` where VIEW is
//! a numeric view index. The product number is the business key carried
//! through every stage and audit entry, so extraction and normalization
//! live in one place.

use std::path::Path;

use chrono::NaiveDate;

/// Image extensions the pipeline accepts from the inbox.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp", "psd"];

/// Characters that are never allowed in an item filename.
pub const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Check whether a path looks like a supported image file.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn stem(filename: &str) -> &str {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    strip_error_prefix(stem)
}

/// Strip the `YYYYMMDDTHHMMSSmmm_` prefix a failed item acquires when it
/// is parked in `errors`, so a file dropped back into the inbox for a
/// retry still yields its product number.
pub fn strip_error_prefix(name: &str) -> &str {
    match name.split_once('_') {
        Some((stamp, rest)) if !rest.is_empty() && is_error_stamp(stamp) => rest,
        _ => name,
    }
}

fn is_error_stamp(stamp: &str) -> bool {
    let bytes = stamp.as_bytes();
    bytes.len() == 18
        && bytes[8] == b'T'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit())
}

/// Extract the product number from a filename.
///
/// A trailing `_N` segment with a numeric N is a view index and is not part
/// of the number. Returns `None` for empty stems.
pub fn extract_product_number(filename: &str) -> Option<String> {
    let stem = stem(filename);
    if stem.is_empty() {
        return None;
    }

    if let Some((head, tail)) = stem.rsplit_once('_') {
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            if head.is_empty() {
                return None;
            }
            return Some(head.to_string());
        }
    }

    Some(stem.to_string())
}

/// The view suffix (`_1`, `_2`, ...) of a filename, or an empty string.
pub fn view_suffix(filename: &str) -> String {
    let stem = stem(filename);
    if let Some((_, tail)) = stem.rsplit_once('_') {
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            return format!("_{tail}");
        }
    }
    String::new()
}

/// Normalize a product number: uppercase, spaces and hyphens become
/// underscores.
pub fn normalize_product_number(number: &str) -> String {
    number
        .trim()
        .to_ascii_uppercase()
        .replace([' ', '-'], "_")
}

/// Check a filename for characters the pipeline refuses to carry.
pub fn has_invalid_chars(filename: &str) -> bool {
    stem(filename).chars().any(|c| INVALID_CHARS.contains(&c))
}

/// Parse the file date out of a dump filename of the form
/// `YYYY-MM-DD_<anything>`.
pub fn parse_dump_date(file_name: &str) -> Option<NaiveDate> {
    let prefix = file_name.get(..10)?;
    if file_name.as_bytes().get(10) != Some(&b'_') {
        return None;
    }
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    #[case("J0801234.jpg", Some("J0801234"), "")]
    #[case("J0801234_2.png", Some("J0801234"), "_2")]
    #[case("A52007_10.tif", Some("A52007"), "_10")]
    #[case("4874123AB.webp", Some("4874123AB"), "")]
    #[case("left_right.png", Some("left_right"), "")]
    #[case("", None, "")]
    fn product_number_extraction(
        #[case] name: &str,
        #[case] number: Option<&str>,
        #[case] suffix: &str,
    ) {
        assert_eq!(extract_product_number(name).as_deref(), number);
        assert_eq!(view_suffix(name), suffix);
    }

    #[test]
    fn normalization_uppercases_and_replaces_separators() {
        assert_eq!(normalize_product_number("j080-12 34"), "J080_12_34");
        assert_eq!(normalize_product_number(" a52007 "), "A52007");
    }

    #[test]
    fn image_extension_filter() {
        assert!(is_image_file(&PathBuf::from("x/J0801234.JPG")));
        assert!(is_image_file(&PathBuf::from("J0801234.psd")));
        assert!(!is_image_file(&PathBuf::from("J0801234.pdf")));
        assert!(!is_image_file(&PathBuf::from("noext")));
    }

    #[test]
    fn dump_date_parsing() {
        assert_eq!(
            parse_dump_date("2026-08-14_Filemaker-Dump.csv"),
            NaiveDate::from_ymd_opt(2026, 8, 14)
        );
        assert_eq!(parse_dump_date("Filemaker-Dump.csv"), None);
        assert_eq!(parse_dump_date("2026-13-99_bad.csv"), None);
    }

    #[test]
    fn parked_items_recover_their_original_name() {
        assert_eq!(
            strip_error_prefix("20260830T101530123_J0801234"),
            "J0801234"
        );
        // A plain view suffix is not a timestamp.
        assert_eq!(strip_error_prefix("J080_1234"), "J080_1234");
        assert_eq!(
            extract_product_number("20260830T101530123_J0801234_2.jpg").as_deref(),
            Some("J0801234")
        );
        assert_eq!(view_suffix("20260830T101530123_J0801234_2.jpg"), "_2");
    }

    #[test]
    fn invalid_character_screen() {
        assert!(has_invalid_chars("what?.png"));
        assert!(!has_invalid_chars("J0801234_2.png"));
    }
}
