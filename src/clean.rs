use std::time::Instant;

use crate::Website;
use crate::error::BuildError;
use crate::io::{as_overhead, remove_dir};

/// Delete the staging and output directories if they exist.
pub fn clean(site: &Website) -> Result<(), BuildError> {
    let s = Instant::now();

    for dir in [site.staging(), site.output()] {
        if remove_dir(&dir)? {
            tracing::debug!("removed {dir}");
        }
    }

    tracing::info!("cleaned the staging and output directories {}", as_overhead(s));

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::site;

    #[test]
    fn clean_is_idempotent() {
        let (_dir, site) = site(&[("temp/index.html", "x"), ("dist/assets/app.js", "y")]);

        clean(&site).unwrap();
        assert!(!site.staging().exists());
        assert!(!site.output().exists());

        clean(&site).unwrap();
        assert!(!site.staging().exists());
        assert!(!site.output().exists());
    }

    #[test]
    fn clean_leaves_sources_alone() {
        let (_dir, site) = site(&[("src/index.html", "x"), ("temp/index.html", "x")]);

        clean(&site).unwrap();
        assert_eq!(fs::read_to_string(site.root.join("src/index.html")).unwrap(), "x");
    }
}
