//! HTML-safe text escaping for user-supplied strings
//!
//! Text is escaped once, when it first arrives. Values read back from storage
//! are already escaped and are re-submitted verbatim by clients, so an edit
//! leaves a value alone when it equals one stored before the edit. Anything
//! else is escaped strictly: a literal `&lt;` typed by a user is stored as
//! `&amp;lt;` and still renders as typed.

use std::collections::BTreeSet;

/// Escape `& < > " '` for safe embedding in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Previously stored (escaped) values of one kind of field
#[derive(Debug, Default, Clone)]
pub struct StoredText<'a> {
    values: BTreeSet<&'a str>,
}

impl<'a> StoredText<'a> {
    pub fn new(values: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Keep `text` if it is a stored value, escape it otherwise
    pub fn escape(&self, text: &str) -> String {
        if self.values.contains(text) {
            text.to_string()
        } else {
            escape_html(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_markup() {
        assert_eq!(
            escape_html(r#"<b>"hi" & 'bye'</b>"#),
            "&lt;b&gt;&quot;hi&quot; &amp; &#39;bye&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_literal_entity_is_escaped() {
        assert_eq!(escape_html("&lt;"), "&amp;lt;");
    }

    #[test]
    fn test_stored_value_passes_through() {
        let once = escape_html("a < b && c");
        let stored = StoredText::new([once.as_str()]);
        assert_eq!(stored.escape(&once), once);
        assert_eq!(stored.escape("&lt;"), "&amp;lt;");
        assert_eq!(StoredText::default().escape(&once), escape_html(&once));
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(escape_html("ランキング 2024"), "ランキング 2024");
    }
}
