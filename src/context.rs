//! Data shared with every markup transform during one build cycle.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One entry of the site navigation.
///
/// Entries without a link are allowed; templates usually render those as
/// separators (e.g. an entry named `divider`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuEntry>,
}

impl MenuEntry {
    pub fn new(name: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: None,
            link: Some(link.into()),
            children: Vec::new(),
        }
    }

    pub fn divider() -> Self {
        Self {
            name: "divider".into(),
            icon: None,
            link: None,
            children: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = MenuEntry>) -> Self {
        self.children.extend(children);
        self
    }
}

/// Immutable data injected into every page render.
///
/// Constructed once per build invocation and only ever handed out by shared
/// reference, so every page of a cycle sees the same menu, metadata and
/// timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct BuildContext {
    pub menu: Vec<MenuEntry>,
    #[serde(rename = "packageMetadata")]
    pub package_metadata: serde_json::Value,
    pub timestamp: DateTime<Local>,
}

impl BuildContext {
    pub fn new(
        menu: Vec<MenuEntry>,
        package_metadata: serde_json::Value,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            menu,
            package_metadata,
            timestamp,
        }
    }

    /// Value handed to the template engine.
    pub(crate) fn to_value(&self) -> minijinja::Value {
        minijinja::Value::from_serialize(self)
    }
}

/// Whether the pipeline produces a deployable tree or feeds the dev server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A one-time production build.
    Build,
    /// A continuous watch mode for development.
    Watch,
}

/// Per-invocation settings that aren't part of the template data.
#[derive(Debug, Clone, Copy)]
pub struct Environment {
    /// The current build mode.
    pub mode: Mode,
    /// The port of the live reload socket (watch mode only).
    pub reload_port: Option<u16>,
}

impl Environment {
    pub fn build() -> Self {
        Self {
            mode: Mode::Build,
            reload_port: None,
        }
    }

    pub fn watch(reload_port: u16) -> Self {
        Self {
            mode: Mode::Watch,
            reload_port: Some(reload_port),
        }
    }

    /// Returns the live reload client injected into staged pages.
    ///
    /// The client understands three messages: `reload` reloads the page,
    /// `styles` re-fetches every stylesheet in place, and `error` shows an
    /// overlay with the failing stage's diagnostic.
    pub fn get_refresh_script(&self) -> Option<String> {
        if self.mode != Mode::Watch {
            return None;
        }

        self.reload_port.map(|port| {
            format!(
                r#"<script>
(() => {{
    const socket = new WebSocket(`ws://${{location.hostname || "localhost"}}:{port}`);
    const clear = () => document.getElementById("__tsumiki_overlay")?.remove();
    socket.addEventListener("message", event => {{
        const message = JSON.parse(event.data);
        switch (message.type) {{
            case "reload":
                window.location.reload();
                break;
            case "styles":
                clear();
                for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {{
                    const url = new URL(link.href);
                    url.searchParams.set("t", Date.now());
                    link.href = url.href;
                }}
                break;
            case "error": {{
                clear();
                const overlay = document.createElement("pre");
                overlay.id = "__tsumiki_overlay";
                overlay.style.cssText = "position:fixed;inset:0;margin:0;padding:2em;overflow:auto;z-index:2147483647;background:rgba(20,0,0,.92);color:#ffb4b4;font:14px/1.4 monospace;white-space:pre-wrap";
                overlay.textContent = message.message;
                document.body.appendChild(overlay);
                break;
            }}
        }}
    }});
}})();
</script>"#
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_exposes_template_names() {
        let context = BuildContext::new(
            vec![MenuEntry::new("Home", "index.html").with_icon("aperture")],
            serde_json::json!({ "name": "demo" }),
            Local::now(),
        );

        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["packageMetadata"]["name"], "demo");
        assert_eq!(json["menu"][0]["icon"], "aperture");
        assert!(json["timestamp"].is_string());
        // optional fields are omitted rather than rendered as null
        assert!(json["menu"][0].get("children").is_none());
    }

    #[test]
    fn menu_entries_deserialize_without_links() {
        let entry: MenuEntry = serde_json::from_str(
            r##"{ "name": "Contact", "link": "#", "children": [{ "name": "divider" }] }"##,
        )
        .unwrap();

        assert_eq!(entry.children, vec![MenuEntry::divider()]);
    }

    #[test]
    fn refresh_script_only_in_watch_mode() {
        assert!(Environment::build().get_refresh_script().is_none());

        let script = Environment::watch(4000).get_refresh_script().unwrap();
        assert!(script.contains(":4000"));
        assert!(script.starts_with("<script>"));
    }
}
