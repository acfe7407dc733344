//! Transform stages: source → staging, one stage per asset category.
//!
//! A stage is an ordered list of [`Transform`]s. The stage runner reads
//! every source file of its category, threads it through the list and
//! writes the result to `staging/<relative path>`. Nothing is written for a
//! file whose transform fails, so a failure never leaves a half-written
//! staged file behind. Staged files whose source is gone are removed before
//! anything is written.

mod markup;
mod script;
mod style;

use std::collections::HashSet;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::asset::{Asset, Category, enumerate, scan_staged};
use crate::context::Environment;
use crate::error::BuildError;
use crate::io::as_overhead;
use crate::Website;

pub use markup::{InjectReload, Render};
pub use script::Transpile;
pub use style::{CompileSass, StyleError};
pub(crate) use style::compress;

/// A pure step `Asset → Asset`.
pub trait Transform: Send + Sync {
    fn apply(&self, asset: Asset) -> anyhow::Result<Asset>;
}

impl<F> Transform for F
where
    F: Fn(Asset) -> anyhow::Result<Asset> + Send + Sync,
{
    fn apply(&self, asset: Asset) -> anyhow::Result<Asset> {
        self(asset)
    }
}

/// Summary of a finished stage run.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub category: Category,
    /// Staged paths, relative to the staging root.
    pub staged: Vec<Utf8PathBuf>,
}

pub struct Stage {
    category: Category,
    transforms: Vec<Box<dyn Transform>>,
}

impl Stage {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            transforms: Vec::new(),
        }
    }

    pub fn then(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// The standard stage of a transformed category.
    ///
    /// Stages are assembled fresh for every run, so templates and compiler
    /// settings are never cached between runs.
    pub fn for_category(site: &Website, env: &Environment, category: Category) -> Self {
        let stage = Stage::new(category);

        match category {
            Category::Markup => {
                let stage = stage.then(Render::new(site.source(), &site.context));
                match env.get_refresh_script() {
                    Some(script) => stage.then(InjectReload::new(script)),
                    None => stage,
                }
            }
            Category::Script => stage.then(Transpile::new(&site.config.esbuild)),
            Category::Style => stage.then(CompileSass::new()),
            _ => stage,
        }
    }

    pub fn name(&self) -> &'static str {
        self.category.name()
    }

    /// Applies the transforms to one asset.
    pub fn apply(&self, asset: Asset) -> Result<Asset, BuildError> {
        let path = asset.source.clone();

        self.transforms
            .iter()
            .try_fold(asset, |asset, transform| transform.apply(asset))
            .map_err(|e| BuildError::transform(self.name(), path, e))
    }

    /// Transforms every source file of the category into staging.
    ///
    /// Files are independent: a failing file doesn't stop the others from
    /// being staged, but the first failure (in path order) is returned.
    pub fn run(&self, site: &Website) -> Result<StageReport, BuildError> {
        let s = Instant::now();
        let staging = site.staging();
        let sources = enumerate(&site.root, &site.config.paths, self.category)?;

        let expected: HashSet<_> = sources
            .iter()
            .map(|source| self.category.staged_path(&source.relative))
            .collect();
        prune(&staging, self.category, &expected)?;

        let results: Vec<Result<Utf8PathBuf, BuildError>> = sources
            .into_par_iter()
            .map(|source| {
                let asset = self.apply(source.load(self.category)?)?;
                crate::io::write(&staging.join(&asset.relative), &asset.content)?;
                Ok(asset.relative)
            })
            .collect();

        let mut staged = Vec::new();
        let mut failure = None;

        for result in results {
            match result {
                Ok(path) => staged.push(path),
                Err(e) => {
                    tracing::error!("{e}");
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        tracing::info!(
            "staged {} {} file(s) {}",
            staged.len(),
            self.name(),
            as_overhead(s)
        );

        Ok(StageReport {
            category: self.category,
            staged,
        })
    }
}

/// Removes staged files of the category that no current source produces.
fn prune(staging: &Utf8Path, category: Category, expected: &HashSet<Utf8PathBuf>) -> Result<(), BuildError> {
    for staged in scan_staged(staging, category)? {
        if !expected.contains(&staged.relative) {
            crate::io::remove_file(&staged.path)?;
            tracing::debug!("removed stale {}", staged.relative);
        }
    }

    Ok(())
}

/// Builds and runs the standard stage of a category.
pub fn run_stage(site: &Website, env: &Environment, category: Category) -> Result<StageReport, BuildError> {
    Stage::for_category(site, env, category).run(site)
}
