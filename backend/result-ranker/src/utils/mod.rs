use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// Compile regex patterns once at startup
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<[^>]*>").expect("hardcoded markup regex is invalid - fix source code")
});

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);")
        .expect("hardcoded entity regex is invalid - fix source code")
});

/// Reduce a result title to the label used as its ranking identity.
///
/// Markup tags are removed, common HTML entities decoded and runs of
/// whitespace collapsed to a single space. `"<b>Foo</b>  bar"` and
/// `"Foo bar"` yield the same label.
pub fn normalize_label(title: &str) -> String {
    let without_tags = TAG_REGEX.replace_all(title, " ");
    let decoded = ENTITY_REGEX.replace_all(&without_tags, |caps: &regex::Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(entity: &str) -> Option<String> {
    let decoded = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        numeric if numeric.starts_with("#x") || numeric.starts_with("#X") => {
            char::from_u32(u32::from_str_radix(&numeric[2..], 16).ok()?)?
        }
        numeric if numeric.starts_with('#') => char::from_u32(numeric[1..].parse().ok()?)?,
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Drop diacritics: decompose (NFD) and discard combining marks
pub fn strip_accents(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}
