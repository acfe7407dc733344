//! Source asset categories and their discovery on disk.

use std::fmt::Display;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{Pattern, glob};

use crate::config::Paths;
use crate::error::BuildError;

/// The six kinds of source files the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Markup,
    Script,
    Style,
    Image,
    Font,
    Extra,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Markup,
        Category::Script,
        Category::Style,
        Category::Image,
        Category::Font,
        Category::Extra,
    ];

    /// Categories with a transform stage writing into staging.
    pub const TRANSFORMED: [Category; 3] = [Category::Markup, Category::Script, Category::Style];

    pub fn name(self) -> &'static str {
        match self {
            Category::Markup => "markup",
            Category::Script => "script",
            Category::Style => "style",
            Category::Image => "image",
            Category::Font => "font",
            Category::Extra => "extra",
        }
    }

    /// Directory that relative paths are measured from.
    pub fn base(self, paths: &Paths) -> &Utf8Path {
        match self {
            Category::Extra => &paths.public,
            _ => &paths.src,
        }
    }

    /// Files processed by a build, relative to [`Category::base`].
    fn entry(self) -> &'static str {
        match self {
            Category::Markup => "*.html",
            Category::Script => "assets/scripts/*.js",
            Category::Style => "assets/styles/*.scss",
            Category::Image => "assets/images/**/*",
            Category::Font => "assets/fonts/**/*",
            Category::Extra => "**/*",
        }
    }

    /// Files whose change should rerun this category. Wider than
    /// [`Category::entry`] where pages and stylesheets pull in partials.
    fn watch(self) -> &'static str {
        match self {
            Category::Markup => "**/*.html",
            Category::Script => "assets/scripts/**/*.js",
            Category::Style => "assets/styles/**/*.scss",
            other => other.entry(),
        }
    }

    /// Files a stage of this category leaves in staging.
    fn staged(self) -> &'static str {
        match self {
            Category::Style => "assets/styles/*.css",
            other => other.entry(),
        }
    }

    /// Where the stage of this category writes a source, relative to the
    /// staging root.
    pub fn staged_path(self, relative: &Utf8Path) -> Utf8PathBuf {
        match self {
            Category::Style => relative.with_extension("css"),
            _ => relative.to_path_buf(),
        }
    }

    /// Absolute pattern matched against filesystem events.
    pub fn watch_pattern(self, root: &Utf8Path, paths: &Paths) -> Result<Pattern, glob::PatternError> {
        Pattern::new(&format!(
            "{}/{}",
            Pattern::escape(root.join(self.base(paths)).as_str()),
            self.watch()
        ))
    }

    /// Directory a filesystem watch is registered on.
    pub fn watch_root(self, root: &Utf8Path, paths: &Paths) -> Utf8PathBuf {
        let base = root.join(self.base(paths));
        let fixed: Utf8PathBuf = Utf8Path::new(self.watch())
            .components()
            .take_while(|c| !c.as_str().contains(['*', '?', '[']))
            .collect();

        base.join(fixed)
    }

    /// Stylesheets starting with an underscore are partials and only
    /// reachable through `@use`/`@import`.
    fn accepts(self, relative: &Utf8Path) -> bool {
        match self {
            Category::Style => !relative.file_name().is_some_and(|name| name.starts_with('_')),
            _ => true,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A file found on disk, not yet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Full path to the file.
    pub path: Utf8PathBuf,
    /// Path relative to the category base, preserved into staging and output.
    pub relative: Utf8PathBuf,
}

impl Source {
    pub fn load(self, category: Category) -> Result<Asset, BuildError> {
        let content = crate::io::read(&self.path)?;

        Ok(Asset {
            source: self.path,
            relative: self.relative,
            category,
            content,
        })
    }
}

/// A source file together with its content as it flows through a stage.
#[derive(Debug, Clone)]
pub struct Asset {
    pub source: Utf8PathBuf,
    pub relative: Utf8PathBuf,
    pub category: Category,
    pub content: Vec<u8>,
}

impl Asset {
    pub fn text(&self) -> anyhow::Result<&str> {
        Ok(std::str::from_utf8(&self.content)?)
    }
}

/// Lists every source file of a category, sorted by path.
pub fn enumerate(root: &Utf8Path, paths: &Paths, category: Category) -> Result<Vec<Source>, BuildError> {
    scan(&root.join(category.base(paths)), category)
}

/// Lists the files of a category found under an arbitrary base directory,
/// such as the staging tree.
pub(crate) fn scan(base: &Utf8Path, category: Category) -> Result<Vec<Source>, BuildError> {
    list(base, category, category.entry())
}

/// Lists what the stage of a category currently has in staging.
pub(crate) fn scan_staged(staging: &Utf8Path, category: Category) -> Result<Vec<Source>, BuildError> {
    list(staging, category, category.staged())
}

fn list(base: &Utf8Path, category: Category, glob_suffix: &str) -> Result<Vec<Source>, BuildError> {
    let pattern = format!("{}/{}", Pattern::escape(base.as_str()), glob_suffix);

    let mut sources = Vec::new();
    for path in glob(&pattern)? {
        let path = Utf8PathBuf::try_from(path?)?;

        if !path.is_file() {
            continue;
        }

        let relative = match path.strip_prefix(base) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => continue,
        };

        if category.accepts(&relative) {
            sources.push(Source { path, relative });
        }
    }

    sources.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(sources)
}
