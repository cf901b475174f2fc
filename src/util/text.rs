use std::borrow::Cow;

/// Turns feed-supplied markup text into plain text.
///
/// The XML layer has already resolved its own escapes, so this pass decodes
/// the HTML entities that feeds double-encode (`&amp;amp;`, `&amp;#8217;`),
/// then strips terminal control sequences and trims surrounding whitespace.
///
/// # Examples
///
/// ```
/// use gator::util::normalize_text;
///
/// assert_eq!(normalize_text("  Fish &amp; Chips "), "Fish & Chips");
/// assert_eq!(normalize_text("It&#8217;s"), "It\u{2019}s");
/// ```
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    strip_control_chars(&decoded).trim().to_string()
}

/// Removes terminal control characters and ANSI escape sequences.
///
/// Tabs, newlines and carriage returns are kept. CSI (`ESC [ ... final`) and OSC
/// (`ESC ] ... BEL` or `ESC ] ... ESC \`) sequences are dropped whole, other C0
/// controls and DEL are dropped individually. Returns the input borrowed when
/// nothing needs removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter and intermediate bytes run until a final byte in 0x40..=0x7e
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
            continue;
        }

        if !is_stripped(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    c == '\x7f' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
}
