//! URL slugs for question titles.

/// Maximum slug length in characters, suffix included
pub const MAX_SLUG_LENGTH: usize = 255;

/// Slug used when a title has no alphanumeric characters at all
const FALLBACK_SLUG: &str = "question";

/// Derive a slug from a title.
///
/// Letters are lowercased, every run of non-alphanumeric characters becomes a
/// single hyphen, hyphens are trimmed from both ends and the result is cut to
/// [`MAX_SLUG_LENGTH`] characters. Non-ASCII letters are kept.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    let slug = truncate_chars(&slug, MAX_SLUG_LENGTH).trim_end_matches('-');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Build the `n`-th collision candidate for `base`: `base-n`, with `base`
/// shortened so the whole slug stays within [`MAX_SLUG_LENGTH`].
pub fn with_suffix(base: &str, n: u64) -> String {
    let suffix = n.to_string();
    let keep = MAX_SLUG_LENGTH.saturating_sub(suffix.len() + 1);
    format!("{}-{}", truncate_chars(base, keep), suffix)
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
