//! Storage key derivation
//!
//! Keys are `<slug>.<ext>` when the image belongs to a named subject, so a
//! new photo for the same place lands on the same key. Without a usable name
//! the key is `<millis>-<random>.<ext>`.

use chrono::{DateTime, Utc};
use rand::Rng;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Extension used when neither file name nor MIME type gives one
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Length of the random part of fallback keys
const RANDOM_SUFFIX_LENGTH: usize = 10;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Letters that don't decompose into a base letter plus marks
fn transliterate(c: char) -> Option<&'static str> {
    match c {
        'đ' | 'ð' => Some("d"),
        'ł' => Some("l"),
        'ø' => Some("o"),
        'ı' => Some("i"),
        'æ' => Some("ae"),
        'œ' => Some("oe"),
        'ß' => Some("ss"),
        'þ' => Some("th"),
        _ => None,
    }
}

/// Normalize a human-readable name into a URL-safe slug
///
/// Lowercases, strips diacritics, turns whitespace runs into hyphens and
/// drops everything outside `[a-z0-9_-]`. Repeated hyphens collapse and
/// leading/trailing hyphens are trimmed, so `slugify(slugify(x)) == slugify(x)`.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        match transliterate(c) {
            Some(ascii) => folded.push_str(ascii),
            None => folded.push(c),
        }
    }

    let mut slug = String::with_capacity(folded.len());
    for c in folded.chars() {
        let mapped = if c.is_whitespace() || c == '-' {
            '-'
        } else if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else {
            continue;
        };

        if mapped == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(mapped);
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Extension for the stored object
///
/// Taken from the original file name when it has a sane one, otherwise from
/// the MIME subtype.
pub fn file_extension(file_name: &str, content_type: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()))
        .filter(|(stem, ext)| {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|(_, ext)| ext);
    if let Some(ext) = from_name {
        return ext;
    }

    let subtype = content_type
        .split(';')
        .next()
        .and_then(|t| t.trim().split_once('/'))
        .map(|(_, sub)| sub.to_ascii_lowercase())
        .unwrap_or_default();
    let subtype = subtype.split('+').next().unwrap_or_default();

    match subtype {
        "jpeg" | "pjpeg" => "jpg".to_string(),
        "" => DEFAULT_EXTENSION.to_string(),
        other if other.chars().all(|c| c.is_ascii_alphanumeric()) => other.to_string(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Timestamp plus random suffix, for images without a subject name
pub fn fallback_stem<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = (0..RANDOM_SUFFIX_LENGTH)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}", now.timestamp_millis(), suffix)
}

/// Derive the storage key for an upload
pub fn storage_key<R: Rng + ?Sized>(
    subject_name: Option<&str>,
    file_name: &str,
    content_type: &str,
    now: DateTime<Utc>,
    rng: &mut R,
) -> String {
    let ext = file_extension(file_name, content_type);
    let stem = subject_name
        .map(slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback_stem(now, rng));
    format!("{}.{}", stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_slugify_vietnamese() {
        assert_eq!(slugify("Dinh Độc Lập"), "dinh-doc-lap");
        assert_eq!(slugify("Chợ Bến Thành"), "cho-ben-thanh");
        assert_eq!(slugify("ĐÀ LẠT"), "da-lat");
        assert_eq!(slugify("Phở Hòa Pasteur"), "pho-hoa-pasteur");
    }

    #[test]
    fn test_slugify_punctuation_and_spacing() {
        assert_eq!(slugify("  Café  de   Flore! "), "cafe-de-flore");
        assert_eq!(slugify("Hotel - Spa & Resort"), "hotel-spa-resort");
        assert_eq!(slugify("under_score ok"), "under_score-ok");
        assert_eq!(slugify("Smørrebrød Straße"), "smorrebrod-strasse");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("東京"), "");
    }

    #[test]
    fn test_slugify_idempotent() {
        let samples = [
            "Dinh Độc Lập",
            "  --Hello   World--  ",
            "Ærø Ø ß",
            "a_b-c d",
            "Nhà thờ Đức Bà Sài Gòn",
            "",
            "!!!",
        ];
        for s in samples {
            let once = slugify(s);
            assert_eq!(slugify(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("photo.JPG", "image/jpeg"), "jpg");
        assert_eq!(file_extension("archive.tar.webp", "image/webp"), "webp");
        assert_eq!(file_extension("noext", "image/png"), "png");
        assert_eq!(file_extension(".hidden", "image/jpeg"), "jpg");
        assert_eq!(file_extension("weird.a b", "image/svg+xml"), "svg");
        assert_eq!(file_extension("x", "image/"), "jpg");
        assert_eq!(file_extension("x", ""), "jpg");
    }

    #[test]
    fn test_storage_key_with_subject() {
        let mut rng = StdRng::seed_from_u64(7);
        let key = storage_key(Some("Dinh Độc Lập"), "IMG_001.PNG", "image/png", Utc::now(), &mut rng);
        assert_eq!(key, "dinh-doc-lap.png");
    }

    #[test]
    fn test_storage_key_fallback() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(7);

        for subject in [None, Some("   "), Some("東京")] {
            let key = storage_key(subject, "photo.jpg", "image/jpeg", now, &mut rng);
            let (stem, ext) = key.rsplit_once('.').unwrap();
            assert_eq!(ext, "jpg");

            let (millis, suffix) = stem.split_once('-').unwrap();
            assert_eq!(millis, now.timestamp_millis().to_string());
            assert_eq!(suffix.len(), RANDOM_SUFFIX_LENGTH);
            assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
        }
    }

    #[test]
    fn test_fallback_keys_differ() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(1);
        let a = fallback_stem(now, &mut rng);
        let b = fallback_stem(now, &mut rng);
        assert_ne!(a, b);
    }
}
