use regex::Regex;
use std::sync::OnceLock;

// Order matters: `&amp;` is decoded after `&lt;`/`&gt;` so `&amp;lt;` stays a literal `&lt;`.
const ENTITIES: [(&str, &str); 6] = [
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&#39;", "'"),
];

const ZERO_WIDTH_SPACE: char = '\u{200b}';

static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();

fn tag_pattern() -> &'static Regex {
    TAG_PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Turns the upstream's HTML fragment into plain text. Entities outside the
/// known set are left untouched.
pub fn strip_html(html: &str) -> String {
    let mut text = tag_pattern().replace_all(html, "").into_owned();
    for (entity, replacement) in ENTITIES {
        if text.contains(entity) {
            text = text.replace(entity, replacement);
        }
    }
    text.retain(|ch| ch != ZERO_WIDTH_SPACE);
    text
}

#[cfg(test)]
mod tests {
    use super::strip_html;

    #[test]
    fn strips_tags_and_decodes_nbsp() {
        assert_eq!(strip_html("<b>Hola&nbsp;Mundo</b>"), "Hola Mundo");
    }

    #[test]
    fn decodes_every_known_entity() {
        assert_eq!(
            strip_html("&lt;a&gt; &amp; &quot;b&quot; &#39;c&#39;"),
            "<a> & \"b\" 'c'"
        );
    }

    #[test]
    fn double_escaped_ampersand_decodes_once() {
        assert_eq!(strip_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn unknown_entities_survive() {
        assert_eq!(strip_html("caf&eacute; &#8212; ok"), "caf&eacute; &#8212; ok");
    }

    #[test]
    fn removes_zero_width_spaces() {
        assert_eq!(strip_html("a\u{200b}b<i>\u{200b}</i>"), "ab");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(strip_html("bonjour le monde"), "bonjour le monde");
    }
}
