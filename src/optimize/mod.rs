//! The optimizer: turns the staging tree into deployable pages and bundles.
//!
//! Every staged page is scanned for reference blocks. Each distinct bundle
//! is concatenated from its members in document order and minified once;
//! every page then has its blocks replaced by a single bundle tag and is
//! minified as a whole. Nothing is written until every page and bundle has
//! been produced, so a failing reference leaves the output tree alone.

mod html;
mod minify;
mod reference;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::Instant;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{info, warn};

use crate::Website;
use crate::asset::{Category, scan};
use crate::error::BuildError;
use crate::io::as_overhead;

pub use minify::{Kind, Minifier};
pub use reference::{ReferenceBlock, ReferenceError, Target, parse, replace};

const STAGE: &str = "optimize";

/// A staged page with its reference blocks.
#[derive(Debug)]
struct Page {
    relative: Utf8PathBuf,
    text: String,
    blocks: Vec<ReferenceBlock>,
}

/// A bundle to produce, with its members resolved to files on disk.
#[derive(Debug)]
struct Bundle {
    target: Target,
    members: Vec<Utf8PathBuf>,
    /// First page that declared the bundle.
    page: Utf8PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Pages written, relative to the output root.
    pub pages: Vec<Utf8PathBuf>,
    /// Bundles written, relative to the output root.
    pub bundles: Vec<Utf8PathBuf>,
}

pub fn optimize(site: &Website) -> Result<OptimizeReport, BuildError> {
    let s = Instant::now();
    let staging = site.staging();
    let output = site.output();
    let minifier = Minifier::new(&site.config.esbuild);

    let pages: Vec<Page> = scan(&staging, Category::Markup)?
        .into_par_iter()
        .map(|source| {
            let bytes = crate::io::read(&source.path)?;
            let text = String::from_utf8(bytes)
                .map_err(|e| BuildError::transform(STAGE, &source.path, e))?;
            let blocks = parse(&text).map_err(|e| BuildError::transform(STAGE, &source.path, e))?;

            Ok(Page {
                relative: source.relative,
                text,
                blocks,
            })
        })
        .collect::<Result<_, BuildError>>()?;

    let bundles = collect_bundles(site, &pages)?;

    let built: Vec<(Utf8PathBuf, String)> = bundles
        .into_par_iter()
        .map(|(path, bundle)| {
            let code = concat(&bundle.members)?;
            let code = minifier
                .minify(bundle.target.kind(), &code)
                .map_err(|e| BuildError::transform(STAGE, staging.join(&path), e))?;
            Ok((path, code))
        })
        .collect::<Result<_, BuildError>>()?;

    let rendered: Vec<(Utf8PathBuf, String)> = pages
        .into_par_iter()
        .map(|page| {
            let html = replace(&page.text, &page.blocks);
            let html = minifier
                .minify(Kind::Html, &html)
                .map_err(|e| BuildError::transform(STAGE, staging.join(&page.relative), e))?;
            Ok((page.relative, html))
        })
        .collect::<Result<_, BuildError>>()?;

    for (path, data) in built.iter().chain(&rendered) {
        crate::io::write(&output.join(path), data)?;
    }

    info!(
        "optimized {} page(s) and {} bundle(s) {}",
        rendered.len(),
        built.len(),
        as_overhead(s)
    );

    Ok(OptimizeReport {
        pages: rendered.into_iter().map(|(path, _)| path).collect(),
        bundles: built.into_iter().map(|(path, _)| path).collect(),
    })
}

/// Deduplicates the bundles declared across all pages, keyed by output
/// path. The first declaration in page order wins.
fn collect_bundles(site: &Website, pages: &[Page]) -> Result<BTreeMap<Utf8PathBuf, Bundle>, BuildError> {
    let mut bundles = BTreeMap::new();

    for page in pages {
        for block in &page.blocks {
            let path = site_path(&page.relative, &block.bundle).ok_or_else(|| {
                BuildError::transform(
                    STAGE,
                    site.staging().join(&page.relative),
                    anyhow::anyhow!("bundle path '{}' leaves the site root", block.bundle),
                )
            })?;

            let members = block
                .members
                .iter()
                .map(|member| resolve(site, page, &block.bundle, member))
                .collect::<Result<Vec<_>, _>>()?;

            match bundles.entry(path) {
                Entry::Vacant(entry) => {
                    entry.insert(Bundle {
                        target: block.target,
                        members,
                        page: page.relative.clone(),
                    });
                }
                Entry::Occupied(entry) => {
                    let first = entry.get();
                    if first.target != block.target || first.members != members {
                        warn!(
                            "bundle '{}' in '{}' differs from its declaration in '{}', keeping the first",
                            entry.key(),
                            page.relative,
                            first.page
                        );
                    }
                }
            }
        }
    }

    Ok(bundles)
}

/// Finds a member on disk, trying the staging tree first and the project
/// root second.
fn resolve(site: &Website, page: &Page, bundle: &str, member: &str) -> Result<Utf8PathBuf, BuildError> {
    let clean = member.split(['?', '#']).next().unwrap_or_default();
    let roots = [site.staging(), site.root.clone()];

    let searched: Vec<Utf8PathBuf> = match site_path(&page.relative, clean) {
        Some(relative) if !clean.contains("://") && !clean.starts_with("//") => {
            roots.iter().map(|root| root.join(&relative)).collect()
        }
        _ => Vec::new(),
    };

    match searched.iter().find(|path| path.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(BuildError::ReferenceResolution {
            page: page.relative.clone(),
            bundle: bundle.to_string(),
            member: member.to_string(),
            searched,
        }),
    }
}

/// Resolves a URL path found in a page to a path relative to the site root.
/// Absolute paths start from the root, others from the page's directory.
/// Returns `None` for paths that climb out of the root.
fn site_path(page: &Utf8Path, url: &str) -> Option<Utf8PathBuf> {
    let joined = match url.strip_prefix('/') {
        Some(absolute) => Utf8PathBuf::from(absolute),
        None => page.parent().unwrap_or(Utf8Path::new("")).join(url),
    };

    let mut out = Utf8PathBuf::new();
    for component in joined.components() {
        match component {
            Utf8Component::Normal(part) => out.push(part),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Utf8Component::RootDir | Utf8Component::Prefix(_) => return None,
        }
    }

    (!out.as_str().is_empty()).then_some(out)
}

fn concat(members: &[Utf8PathBuf]) -> Result<String, BuildError> {
    let mut parts = Vec::with_capacity(members.len());

    for path in members {
        let bytes = crate::io::read(path)?;
        let text = String::from_utf8(bytes).map_err(|e| BuildError::transform(STAGE, path, e))?;
        parts.push(text);
    }

    Ok(parts.join("\n"))
}
