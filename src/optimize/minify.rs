//! Per-type minifiers.
//!
//! Scripts go through Esbuild with identifier mangling off, stylesheets
//! through the Sass compiler in compressed mode, and pages through a
//! whitespace collapser that also minifies inline `<script>` and `<style>`.

use crate::config::EsbuildConfig;
use crate::esbuild::Esbuild;
use crate::optimize::html::{self, Token, TokenKind};
use crate::transform::StyleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Js,
    Css,
    Html,
}

/// Elements around which whitespace doesn't render. Elements that take no
/// box of their own (`script`, `link`, ...) are left out, the text on their
/// other side may still be inline.
const BLOCK: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "caption", "col", "colgroup",
    "dd", "details", "dialog", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hr", "html", "li", "main",
    "nav", "ol", "optgroup", "option", "p", "pre", "section", "summary", "table", "tbody", "td",
    "tfoot", "th", "thead", "title", "tr", "ul",
];

const JS_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "text/ecmascript",
    "application/ecmascript",
    "module",
];

#[derive(Debug, Clone)]
pub struct Minifier {
    esbuild: Esbuild,
}

impl Minifier {
    pub fn new(config: &EsbuildConfig) -> Self {
        Self {
            esbuild: Esbuild::new(config),
        }
    }

    pub fn minify(&self, kind: Kind, code: &str) -> anyhow::Result<String> {
        match kind {
            Kind::Js => self.js(code),
            Kind::Css => Ok(css(code)?),
            Kind::Html => self.html(code),
        }
    }

    fn js(&self, code: &str) -> anyhow::Result<String> {
        let out = self.esbuild.minify(code.as_bytes())?;
        Ok(String::from_utf8(out)?.trim_end().to_string())
    }

    fn html(&self, code: &str) -> anyhow::Result<String> {
        let tokens = html::tokenize(code);
        let mut out = String::with_capacity(code.len());

        for (i, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Tag => out.push_str(&collapse_tag(token.text)),
                TokenKind::Comment => out.push_str(token.text),
                TokenKind::Raw => {
                    // a raw token always follows the tag that opened it
                    let open = i.checked_sub(1).map_or("", |j| tokens[j].text);
                    out.push_str(&self.raw(open, token.text)?);
                }
                TokenKind::Text => {
                    // comments are transparent, the nearest other token decides
                    let before = tokens[..i].iter().rev().find(|t| !is_comment(t));
                    let after = tokens[i + 1..].iter().find(|t| !is_comment(t));
                    let trim_start = before.is_none_or(is_block);
                    let trim_end = after.is_none_or(is_block);
                    out.push_str(&collapse_text(token.text, trim_start, trim_end));
                }
            }
        }

        Ok(out)
    }

    fn raw(&self, open: &str, content: &str) -> anyhow::Result<String> {
        let blank = content.trim().is_empty();

        match html::tag_name(open).as_str() {
            "script" | "style" if blank => Ok(String::new()),
            "script" if is_js(open) => self.js(content),
            "style" => Ok(css(content)?.trim_end().to_string()),
            _ => Ok(content.to_string()),
        }
    }
}

fn css(code: &str) -> Result<String, StyleError> {
    crate::transform::compress(code)
}

fn is_js(tag: &str) -> bool {
    html::attribute(tag, "type")
        .is_none_or(|kind| kind.is_empty() || JS_TYPES.iter().any(|t| t.eq_ignore_ascii_case(kind.trim())))
}

fn is_comment(token: &&Token<'_>) -> bool {
    token.kind == TokenKind::Comment
}

fn is_block(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::Tag => {
            let name = html::tag_name(token.text);
            name.starts_with('!') || name.starts_with('?') || BLOCK.contains(&name.as_str())
        }
        TokenKind::Comment | TokenKind::Text | TokenKind::Raw => false,
    }
}

/// Collapses whitespace runs outside quoted values and drops the space
/// before the closing bracket.
fn collapse_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut quote = None;
    let mut in_space = false;

    for ch in tag.chars() {
        if quote.is_none() && ch.is_ascii_whitespace() {
            in_space = true;
            continue;
        }

        if in_space {
            out.push(' ');
            in_space = false;
        }

        match quote {
            Some(q) if ch == q => quote = None,
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            _ => {}
        }

        out.push(ch);
    }

    let Some(body) = out.strip_suffix('>') else {
        return out;
    };

    match body.strip_suffix('/') {
        Some(body) => format!("{}/>", body.trim_end()),
        None => format!("{}>", body.trim_end()),
    }
}

/// Collapses whitespace runs in text to one space, dropping it entirely at
/// edges next to block-level boundaries.
fn collapse_text(text: &str, trim_start: bool, trim_end: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    let mut seen = false;

    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            in_space = true;
            continue;
        }

        if in_space && (seen || !trim_start) {
            out.push(' ');
        }

        in_space = false;
        seen = true;
        out.push(ch);
    }

    if in_space && !trim_end && (seen || !trim_start) {
        out.push(' ');
    }

    out
}
