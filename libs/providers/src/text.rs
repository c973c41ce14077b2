//! Conversion of stored rich-text message bodies into provider-safe plain text.

/// Strips markup from a message body for providers that only accept plain
/// text: tags are dropped (`script`/`style` with their contents), the common
/// entities are decoded, and whitespace is collapsed.
///
/// ```
/// use chatsync_providers::strip_html;
///
/// assert_eq!(strip_html("<p>hola  <b>mundo</b></p>"), "hola mundo");
/// ```
pub fn strip_html(body: &str) -> String {
    fn starts_with_ci(haystack: &str, needle: &str) -> bool {
        haystack.len() >= needle.len()
            && haystack.as_bytes()[..needle.len()].eq_ignore_ascii_case(needle.as_bytes())
    }

    fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
        let hay = haystack.as_bytes();
        let ned = needle.as_bytes();
        if hay.len() < from + ned.len() {
            return None;
        }
        (from..=hay.len() - ned.len()).find(|&i| hay[i..i + ned.len()].eq_ignore_ascii_case(ned))
    }

    let mut text = String::with_capacity(body.len());
    let mut chars = body.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '<' {
            text.push(c);
            continue;
        }
        // Skip script/style elements wholesale, other tags just get dropped.
        let skip_until = if starts_with_ci(&body[i..], "<script") {
            Some("</script>")
        } else if starts_with_ci(&body[i..], "<style") {
            Some("</style>")
        } else {
            None
        };
        match skip_until {
            Some(closer) => match find_ci(body, closer, i) {
                Some(pos) => {
                    let end = pos + closer.len();
                    while chars.peek().is_some_and(|(j, _)| *j < end) {
                        chars.next();
                    }
                    text.push(' ');
                }
                None => break, // unterminated element, drop the tail
            },
            None => {
                // Consume through the closing '>'; a '>' inside an attribute
                // value is rare enough not to matter for chat bodies.
                for (_, tc) in chars.by_ref() {
                    if tc == '>' {
                        break;
                    }
                }
                text.push(' ');
            }
        }
    }

    // `&amp;` last, so `&amp;lt;` decodes to `&lt;` and not `<`.
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
