//! Just enough HTML tokenizing for reference blocks and whitespace
//! collapsing. Tags are kept as raw slices; nothing is validated.

/// Elements whose content is never parsed as markup.
const RAW: [&str; 4] = ["script", "style", "pre", "textarea"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Opening, closing or declaration tag, including the angle brackets.
    Tag,
    /// `<!-- ... -->`, including the markers.
    Comment,
    /// Text between tags.
    Text,
    /// Content of a raw-text element (`script`, `style`, `pre`, `textarea`).
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the token in the input.
    pub offset: usize,
}

pub fn tokenize(html: &str) -> Vec<Token<'_>> {
    let bytes = html.as_bytes();
    let lower = html.to_ascii_lowercase();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }

        if html[pos..].starts_with("<!--") {
            push(&mut tokens, html, TokenKind::Text, text_start, pos);
            let end = html[pos + 4..]
                .find("-->")
                .map_or(bytes.len(), |i| pos + 4 + i + 3);
            push(&mut tokens, html, TokenKind::Comment, pos, end);
            pos = end;
            text_start = end;
            continue;
        }

        let starts_tag = bytes
            .get(pos + 1)
            .is_some_and(|b| b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'));

        if !starts_tag {
            pos += 1;
            continue;
        }

        push(&mut tokens, html, TokenKind::Text, text_start, pos);
        let end = tag_end(bytes, pos);
        let tag = &html[pos..end];
        push(&mut tokens, html, TokenKind::Tag, pos, end);
        pos = end;

        let name = tag_name(tag);
        if !tag.starts_with("</") && RAW.contains(&name.as_str()) {
            let close = format!("</{name}");
            let raw_end = lower[end..].find(&close).map_or(bytes.len(), |i| end + i);
            push(&mut tokens, html, TokenKind::Raw, end, raw_end);
            pos = raw_end;
        }

        text_start = pos;
    }

    push(&mut tokens, html, TokenKind::Text, text_start, bytes.len());
    tokens
}

fn push<'a>(tokens: &mut Vec<Token<'a>>, html: &'a str, kind: TokenKind, start: usize, end: usize) {
    if end > start {
        tokens.push(Token {
            kind,
            text: &html[start..end],
            offset: start,
        });
    }
}

/// Finds the byte after the `>` closing the tag at `start`, skipping over
/// quoted attribute values.
fn tag_end(bytes: &[u8], start: usize) -> usize {
    let mut quote = None;

    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return i + 1,
                _ => {}
            },
        }
    }

    bytes.len()
}

/// Lowercase element name of a tag: `<Script src=..>` → `script`,
/// `</p>` → `p`, `<!DOCTYPE html>` → `!doctype`.
pub fn tag_name(tag: &str) -> String {
    let inner = tag.trim_start_matches('<').trim_start_matches('/');
    let (bang, inner) = match inner.strip_prefix('!') {
        Some(rest) => ("!", rest),
        None => ("", inner),
    };

    let name: String = inner
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | ':'))
        .collect();

    format!("{bang}{}", name.to_ascii_lowercase())
}

/// Value of an attribute, matched case-insensitively. Valueless
/// attributes yield an empty string.
pub fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let bytes = tag.as_bytes();
    let mut pos = 1;

    // skip the element name
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' {
        pos += 1;
    }

    loop {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b'/') {
            pos += 1;
        }

        if pos >= bytes.len() || bytes[pos] == b'>' {
            return None;
        }

        let key_start = pos;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'=' | b'>' | b'/')
        {
            pos += 1;
        }
        let key = &tag[key_start..pos];

        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let value = if bytes.get(pos) == Some(&b'=') {
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }

            match bytes.get(pos) {
                Some(&q @ (b'"' | b'\'')) => {
                    let start = pos + 1;
                    let end = tag[start..].find(q as char).map_or(tag.len(), |i| start + i);
                    pos = (end + 1).min(tag.len());
                    &tag[start..end]
                }
                _ => {
                    let start = pos;
                    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' {
                        pos += 1;
                    }
                    &tag[start..pos]
                }
            }
        } else {
            ""
        };

        if key.eq_ignore_ascii_case(name) {
            return Some(value);
        }
    }
}
