use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// `<script>`/`<style>` blocks and HTML comments, removed together with their bodies.
static HIDDEN_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->")
        .expect("hidden block regex")
});

/// Any remaining tag, opening or closing.
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)</?[A-Za-z!][^>]*>").expect("tag regex"));

/// Collapses every run of whitespace into a single space and trims both ends.
///
/// ```
/// use threatwire::util::collapse_whitespace;
///
/// assert_eq!(collapse_whitespace("  Patch\n\tTuesday  "), "Patch Tuesday");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Converts an HTML fragment into plain text.
///
/// Script and style bodies are dropped, every tag is replaced by a space so
/// adjacent blocks do not glue together, entities are decoded, control
/// characters stripped and whitespace collapsed.
///
/// ```
/// use threatwire::util::strip_markup;
///
/// let html = "<p>New <b>ransomware</b>&nbsp;strain</p><script>track()</script>";
/// assert_eq!(strip_markup(html), "New ransomware strain");
/// ```
pub fn strip_markup(s: &str) -> String {
    if !s.contains('<') && !s.contains('&') {
        return collapse_whitespace(&strip_control_chars(s));
    }

    let without_hidden = HIDDEN_BLOCKS.replace_all(s, " ");
    let without_tags = TAGS.replace_all(&without_hidden, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    collapse_whitespace(&strip_control_chars(&decoded))
}

fn is_control(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
}

/// Strips ASCII control characters and ANSI escape sequences from feed text.
///
/// Tab, newline and carriage return survive. CSI (`ESC [`) sequences are
/// consumed up to their final byte, OSC (`ESC ]`) sequences up to BEL or ST.
///
/// Returns `Cow::Borrowed` when nothing needs removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| is_control(b)) {
        return Cow::Borrowed(s);
    }

    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];
        if b == 0x1b {
            match bytes.get(i + 1) {
                Some(b'[') => {
                    i += 2;
                    while i < len {
                        let c = bytes[i];
                        i += 1;
                        if (0x40..=0x7e).contains(&c) {
                            break;
                        }
                    }
                }
                Some(b']') => {
                    i += 2;
                    while i < len {
                        if bytes[i] == 0x07 {
                            i += 1;
                            break;
                        }
                        if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                            i += 2;
                            break;
                        }
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        } else if is_control(b) {
            i += 1;
        } else {
            let start = i;
            while i < len && !is_control(bytes[i]) {
                i += 1;
            }
            // Only ASCII control bytes end a run, so the slice stays on char boundaries.
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}
