use camino::Utf8Path;
use minijinja::Environment;

use crate::asset::Asset;
use crate::context::BuildContext;
use crate::transform::Transform;

/// Renders a page template with the build context.
///
/// Pages may `{% extends %}` or `{% include %}` any template under the
/// source directory. The engine is created per stage run, so edits to
/// layouts and partials are always picked up.
pub struct Render {
    templates: Environment<'static>,
    context: minijinja::Value,
}

impl Render {
    pub fn new(source_dir: impl AsRef<Utf8Path>, context: &BuildContext) -> Self {
        let mut templates = Environment::new();
        templates.set_loader(minijinja::path_loader(source_dir.as_ref().as_std_path()));

        Self {
            templates,
            context: context.to_value(),
        }
    }
}

impl Transform for Render {
    fn apply(&self, mut asset: Asset) -> anyhow::Result<Asset> {
        let name = asset.relative.as_str().to_string();
        let rendered = self
            .templates
            .render_named_str(&name, asset.text()?, &self.context)?;

        asset.content = rendered.into_bytes();
        Ok(asset)
    }
}

/// Adds the live reload client to a rendered page, right before `</body>`
/// when there is one.
pub struct InjectReload {
    script: String,
}

impl InjectReload {
    pub fn new(script: String) -> Self {
        Self { script }
    }
}

impl Transform for InjectReload {
    fn apply(&self, mut asset: Asset) -> anyhow::Result<Asset> {
        let mut html = asset.text()?.to_string();
        let at = html
            .to_ascii_lowercase()
            .rfind("</body>")
            .unwrap_or(html.len());

        html.insert_str(at, &self.script);
        asset.content = html.into_bytes();
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Local;

    use super::*;
    use crate::asset::Category;
    use crate::context::MenuEntry;

    fn page(text: &str) -> Asset {
        Asset {
            source: "src/index.html".into(),
            relative: "index.html".into(),
            category: Category::Markup,
            content: text.as_bytes().to_vec(),
        }
    }

    fn render(dir: &Utf8Path, context: &BuildContext, text: &str) -> String {
        let out = Render::new(dir, context).apply(page(text)).unwrap();
        String::from_utf8(out.content).unwrap()
    }

    fn context(menu: Vec<MenuEntry>) -> BuildContext {
        BuildContext::new(menu, serde_json::json!({ "name": "demo" }), Local::now())
    }

    #[test]
    fn package_metadata_is_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();

        let html = render(dir, &context(vec![]), "<h1>{{ packageMetadata.name }}</h1>");
        assert_eq!(html, "<h1>demo</h1>");
    }

    #[test]
    fn nested_menu_children_render_once_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();

        let menu = vec![
            MenuEntry::new("Home", "index.html").with_icon("aperture"),
            MenuEntry::new("Contact", "#").with_children([
                MenuEntry::new("Twitter", "https://twitter.com/"),
                MenuEntry::new("About", "https://weibo.com/"),
                MenuEntry::divider(),
                MenuEntry::new("About", "https://github.com/"),
            ]),
        ];

        let template = "{% for item in menu %}{% if item.name == 'Contact' %}\
            {% for child in item.children %}[{{ child.name }}]{% endfor %}\
            {% endif %}{% endfor %}";

        let html = render(dir, &context(menu), template);
        assert_eq!(html, "[Twitter][About][divider][About]");
    }

    #[test]
    fn layouts_are_resolved_from_the_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(dir.join("layouts")).unwrap();
        std::fs::write(
            dir.join("layouts/basic.html"),
            "<main>{% block body %}{% endblock %}</main>",
        )
        .unwrap();

        let html = render(
            dir,
            &context(vec![]),
            r#"{% extends "layouts/basic.html" %}{% block body %}hi {{ packageMetadata.name }}{% endblock %}"#,
        );
        assert_eq!(html, "<main>hi demo</main>");
    }

    #[test]
    fn template_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();

        let result = Render::new(dir, &context(vec![])).apply(page("{% for x in %}"));
        assert!(result.is_err());
    }

    #[test]
    fn reload_client_goes_before_body_end() {
        let out = InjectReload::new("<script>x</script>".into())
            .apply(page("<html><body><p>hi</p></BODY></html>"))
            .unwrap();

        assert_eq!(
            String::from_utf8(out.content).unwrap(),
            "<html><body><p>hi</p><script>x</script></BODY></html>"
        );
    }

    #[test]
    fn reload_client_is_appended_without_body() {
        let out = InjectReload::new("<script>x</script>".into())
            .apply(page("<p>fragment</p>"))
            .unwrap();

        assert_eq!(
            String::from_utf8(out.content).unwrap(),
            "<p>fragment</p><script>x</script>"
        );
    }
}
