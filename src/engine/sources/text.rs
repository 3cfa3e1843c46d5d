//! Text helpers shared by the source parsers.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Snippets cut from free-form bodies are capped at this many characters.
pub const SNIPPET_CHARS: usize = 200;

/// Separator placed between snippet fragments.
pub const FRAGMENT_SEPARATOR: &str = " \u{00B7} ";

/// Percent-encode with `encodeURIComponent` rules, which the upstream
/// endpoints were written against.
pub fn encode_component(raw: &str) -> String {
    // urlencoding keeps only `-_.~`; browsers also leave `!'()*` alone.
    urlencoding::encode(raw)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&(amp|lt|gt|quot|apos|#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6});")
            .expect("entity pattern is valid")
    })
}

/// Decode the HTML entities upstream APIs leave in titles.
///
/// Single pass, so `&amp;lt;` becomes `&lt;` and not `<`.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    entity_pattern()
        .replace_all(input, |caps: &Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        name[1..].parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Body excerpt: truncated to [`SNIPPET_CHARS`] with newlines flattened to spaces.
pub fn excerpt(body: &str) -> String {
    truncate_chars(body, SNIPPET_CHARS).replace(['\r', '\n'], " ")
}

/// Join non-empty fragments with [`FRAGMENT_SEPARATOR`].
pub fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fragments
        .into_iter()
        .filter(|f| !f.as_ref().is_empty())
        .map(|f| f.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR)
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `Some(s)` only for non-empty strings; upstream payloads use `""` and `null` interchangeably.
pub fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_entities() {
        assert_eq!(decode_entities("A &amp; B &lt;test&gt;"), "A & B <test>");
        assert_eq!(decode_entities("&quot;quoted&quot;"), "\"quoted\"");
    }

    #[test]
    fn decodes_apostrophe_variants_and_slash() {
        assert_eq!(decode_entities("it&#39;s"), "it's");
        assert_eq!(decode_entities("it&#x27;s"), "it's");
        assert_eq!(decode_entities("a&#x2F;b"), "a/b");
    }

    #[test]
    fn decoding_is_single_pass() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn leaves_unknown_entities_alone() {
        assert_eq!(decode_entities("&nbsp;&bogus; & x"), "&nbsp;&bogus; & x");
    }

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(encode_component("rust async/await"), "rust%20async%2Fawait");
        assert_eq!(encode_component("it's (fine)!*~"), "it's%20(fine)!*~");
        assert_eq!(encode_component("c++ & ü"), "c%2B%2B%20%26%20%C3%BC");
    }

    #[test]
    fn excerpt_truncates_and_flattens() {
        let body = format!("line one\nline two{}", "x".repeat(300));
        let out = excerpt(&body);
        assert_eq!(out.chars().count(), SNIPPET_CHARS);
        assert!(out.starts_with("line one line two"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn join_skips_empty_fragments() {
        assert_eq!(join_fragments(["a", "", "b"]), "a \u{00B7} b");
        assert_eq!(join_fragments(Vec::<String>::new()), "");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}
