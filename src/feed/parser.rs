use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::util::normalize_text;

/// Maximum element nesting accepted before the document is rejected.
const MAX_DEPTH: usize = 64;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors that can occur while parsing a feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not valid UTF-8
    #[error("Feed is not valid UTF-8")]
    Encoding,

    /// The body is not well-formed XML
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The document ended with elements still open
    #[error("Unexpected end of document")]
    UnexpectedEof,

    /// Well-formed XML without a `<channel>` element
    #[error("Document is not an RSS feed (no <channel> element)")]
    MissingChannel,

    /// Element nesting exceeds the safety limit
    #[error("Feed nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// A parsed syndication document with its entries in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

/// One entry of a feed. `pub_date` is the raw string from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Parses an RSS 2.0 or RSS 1.0 (RDF) document.
///
/// Text and CDATA chunks are concatenated per element. Only unprefixed
/// `<link>` elements are read, so `<atom:link/>` never shadows the channel
/// link. Titles and descriptions are HTML-entity-decoded and trimmed; links
/// and dates are trimmed.
///
/// # Security
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations: only the five XML
/// builtins and character references are resolved, so entity-expansion attacks
/// are structurally impossible. Nesting is capped at [`MAX_DEPTH`].
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(body).map_err(|_| ParseError::Encoding)?;

    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut doc = FeedDocument::default();
    let mut current: Option<FeedItem> = None;
    let mut saw_channel = false;

    loop {
        match reader
            .read_event()
            .map_err(|e| ParseError::Xml(e.to_string()))?
        {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                }
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"channel" => saw_channel = true,
                    b"item" => current = Some(FeedItem::default()),
                    _ => {}
                }
                stack.push(name);
                // A repeated field keeps only its last occurrence
                if let Some(target) = text_target(&stack, &mut doc, current.as_mut()) {
                    target.clear();
                }
            }
            Event::End(_) => {
                if stack.pop().as_deref() == Some(b"item".as_slice()) {
                    if let Some(item) = current.take() {
                        doc.items.push(item);
                    }
                }
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"channel" => saw_channel = true,
                b"item" => doc.items.push(FeedItem::default()),
                name => {
                    stack.push(name.to_vec());
                    if let Some(target) = text_target(&stack, &mut doc, current.as_mut()) {
                        target.clear();
                    }
                    stack.pop();
                }
            },
            Event::Text(t) => {
                let chunk = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                if let Some(target) = text_target(&stack, &mut doc, current.as_mut()) {
                    target.push_str(&chunk);
                }
            }
            Event::CData(c) => {
                let chunk = std::str::from_utf8(&c).map_err(|_| ParseError::Encoding)?;
                if let Some(target) = text_target(&stack, &mut doc, current.as_mut()) {
                    target.push_str(chunk);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::UnexpectedEof);
    }
    if !saw_channel {
        return Err(ParseError::MissingChannel);
    }

    Ok(normalize(doc))
}

/// Resolves which field the text under the current element belongs to.
fn text_target<'a>(
    stack: &[Vec<u8>],
    doc: &'a mut FeedDocument,
    item: Option<&'a mut FeedItem>,
) -> Option<&'a mut String> {
    let [.., parent, field] = stack else {
        return None;
    };

    match (parent.as_slice(), field.as_slice()) {
        (b"channel", b"title") => Some(&mut doc.title),
        (b"channel", b"link") => Some(&mut doc.link),
        (b"channel", b"description") => Some(&mut doc.description),
        (b"item", b"title") => item.map(|i| &mut i.title),
        (b"item", b"link") => item.map(|i| &mut i.link),
        (b"item", b"description") => item.map(|i| &mut i.description),
        (b"item", b"pubDate") => item.map(|i| &mut i.pub_date),
        _ => None,
    }
}

fn normalize(doc: FeedDocument) -> FeedDocument {
    FeedDocument {
        title: normalize_text(&doc.title),
        link: doc.link.trim().to_string(),
        description: normalize_text(&doc.description),
        items: doc
            .items
            .into_iter()
            .map(|item| FeedItem {
                title: normalize_text(&item.title),
                link: item.link.trim().to_string(),
                description: normalize_text(&item.description),
                pub_date: item.pub_date.trim().to_string(),
            })
            .collect(),
    }
}
