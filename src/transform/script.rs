use crate::asset::Asset;
use crate::config::EsbuildConfig;
use crate::esbuild::Esbuild;
use crate::transform::Transform;

/// Lowers each script to the configured language level, one file in, one
/// file out.
pub struct Transpile {
    esbuild: Esbuild,
}

impl Transpile {
    pub fn new(config: &EsbuildConfig) -> Self {
        Self {
            esbuild: Esbuild::new(config),
        }
    }
}

impl Transform for Transpile {
    fn apply(&self, mut asset: Asset) -> anyhow::Result<Asset> {
        asset.content = self.esbuild.transpile(&asset.source, &asset.content)?;
        Ok(asset)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use crate::asset::Category;
    use crate::context::Environment;
    use crate::test_support::site_with;
    use crate::transform::run_stage;

    #[test]
    fn scripts_stage_one_to_one() {
        let (_dir, site) = site_with(
            &[
                ("src/assets/scripts/main.js", "const a = () => 1;\n"),
                ("src/assets/scripts/extra.js", "let b = 2;\n"),
            ],
            |config, root| config.esbuild = crate::esbuild::stub(root),
        );

        let report = run_stage(&site, &Environment::build(), Category::Script).unwrap();

        assert_eq!(
            report.staged,
            ["assets/scripts/extra.js", "assets/scripts/main.js"]
        );
        assert_eq!(
            fs::read_to_string(site.staging().join("assets/scripts/main.js")).unwrap(),
            "const a = () => 1;\n"
        );
    }
}
