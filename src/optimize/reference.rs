//! Reference blocks: comment-delimited regions of a page naming the
//! scripts or stylesheets to bundle.
//!
//! ```html
//! <!-- build:js assets/scripts/vendor.js -->
//! <script src="/node_modules/jquery/dist/jquery.js"></script>
//! <script src="assets/scripts/main.js"></script>
//! <!-- endbuild -->
//! ```

use std::ops::Range;

use thiserror::Error;

use crate::optimize::html::{self, TokenKind};
use crate::optimize::minify::Kind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Unknown bundle type '{0}', expected 'js' or 'css'.")]
    UnknownTarget(String),

    #[error("Reference block at byte {0} doesn't name a bundle.")]
    MissingBundle(usize),

    #[error("Reference block '{0}' has no matching endbuild marker.")]
    Unclosed(String),

    #[error("Endbuild marker at byte {0} has no matching build marker.")]
    Unopened(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Js,
    Css,
}

impl Target {
    fn parse(text: &str) -> Result<Self, ReferenceError> {
        match text {
            "js" => Ok(Target::Js),
            "css" => Ok(Target::Css),
            other => Err(ReferenceError::UnknownTarget(other.to_string())),
        }
    }

    pub fn kind(self) -> Kind {
        match self {
            Target::Js => Kind::Js,
            Target::Css => Kind::Css,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceBlock {
    /// Output path of the bundle, as written in the page.
    pub bundle: String,
    pub target: Target,
    /// `src`/`href` values of the enclosed tags, in document order.
    pub members: Vec<String>,
    /// Bytes of the page covered by the block, markers included.
    pub span: Range<usize>,
}

impl ReferenceBlock {
    /// The single tag that replaces the block in the optimized page.
    pub fn tag(&self) -> String {
        match self.target {
            Target::Js => format!(r#"<script src="{}"></script>"#, self.bundle),
            Target::Css => format!(r#"<link rel="stylesheet" href="{}">"#, self.bundle),
        }
    }
}

/// Finds every reference block of a page, in document order.
pub fn parse(page: &str) -> Result<Vec<ReferenceBlock>, ReferenceError> {
    let tokens = html::tokenize(page);
    let mut blocks = Vec::new();
    let mut open: Option<(usize, usize, Target, String)> = None;

    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Comment {
            continue;
        }

        let body = token
            .text
            .trim_start_matches("<!--")
            .trim_end_matches("-->")
            .trim();

        if let Some(header) = body.strip_prefix("build:") {
            if let Some((.., bundle)) = open {
                return Err(ReferenceError::Unclosed(bundle));
            }

            let mut parts = header.split_whitespace();
            let target = Target::parse(parts.next().unwrap_or_default())?;
            let bundle = parts
                .next()
                .ok_or(ReferenceError::MissingBundle(token.offset))?;

            open = Some((i, token.offset, target, bundle.to_string()));
        } else if body == "endbuild" {
            let Some((first, start, target, bundle)) = open.take() else {
                return Err(ReferenceError::Unopened(token.offset));
            };

            let members = tokens[first + 1..i]
                .iter()
                .filter(|t| t.kind == TokenKind::Tag)
                .filter_map(|t| member(t.text, target))
                .collect();

            blocks.push(ReferenceBlock {
                bundle,
                target,
                members,
                span: start..token.offset + token.text.len(),
            });
        }
    }

    match open {
        Some((.., bundle)) => Err(ReferenceError::Unclosed(bundle)),
        None => Ok(blocks),
    }
}

fn member(tag: &str, target: Target) -> Option<String> {
    let value = match (target, html::tag_name(tag).as_str()) {
        (Target::Js, "script") => html::attribute(tag, "src"),
        (Target::Css, "link") => html::attribute(tag, "href"),
        _ => None,
    }?;

    (!value.is_empty()).then(|| value.to_string())
}

/// Replaces every block with its bundle tag. Everything outside the blocks
/// is copied through untouched.
pub fn replace(page: &str, blocks: &[ReferenceBlock]) -> String {
    let mut out = String::with_capacity(page.len());
    let mut last = 0;

    for block in blocks {
        out.push_str(&page[last..block.span.start]);
        out.push_str(&block.tag());
        last = block.span.end;
    }

    out.push_str(&page[last..]);
    out
}
