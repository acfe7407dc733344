#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use image::{Rgba, RgbaImage};
use tempfile::TempDir;
use tsumiki::{BuildContext, BuildError, Config, MenuEntry, Website};

const LAYOUT: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>{{ packageMetadata.name }}</title>
  <!-- build:css assets/styles/app.css -->
  <link rel="stylesheet" href="assets/styles/main.css">
  <!-- endbuild -->
</head>
<body>
  <nav>{% for item in menu %}<a href="{{ item.link }}">{{ item.name }}</a>{% endfor %}</nav>
  {% block body %}{% endblock %}
  <!-- build:js assets/scripts/app.js -->
  <script src="assets/scripts/main.js"></script>
  <script src="assets/scripts/extra.js"></script>
  <!-- endbuild -->
</body>
</html>
"#;

const INDEX: &str = r#"{% extends "layouts/basic.html" %}{% block body %}<main>
  <p>Hello   world</p>
</main>{% endblock %}"#;

fn project(files: &[(&str, &str)]) -> (TempDir, Website) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();

    for (path, content) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    // stands in for esbuild, echoing its input
    let stub = root.join("esbuild-stub.sh");
    fs::write(&stub, "#!/bin/sh\nexec cat\n").unwrap();
    fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = Config::default();
    config.esbuild.program = stub.into_string();
    config.menu = vec![
        MenuEntry::new("Home", "index.html"),
        MenuEntry::new("About", "about.html"),
    ];

    let context = BuildContext::new(
        config.menu.clone(),
        serde_json::json!({ "name": "demo" }),
        Local::now(),
    );

    (dir, Website::new(root, config, context))
}

fn full_project() -> (TempDir, Website) {
    let (dir, site) = project(&[
        ("src/layouts/basic.html", LAYOUT),
        ("src/index.html", INDEX),
        ("src/assets/scripts/main.js", "var a = 1;\n"),
        ("src/assets/scripts/extra.js", "var b = a;\n"),
        ("src/assets/styles/_vars.scss", "$accent: red;\n"),
        (
            "src/assets/styles/main.scss",
            "@use \"vars\";\nbody { color: vars.$accent; }\n",
        ),
        ("src/assets/fonts/body.woff2", "font-bytes"),
        ("public/robots.txt", "User-agent: *\n"),
    ]);

    fs::create_dir_all(site.source().join("assets/images")).unwrap();
    logo().save(site.source().join("assets/images/logo.png")).unwrap();

    (dir, site)
}

fn logo() -> RgbaImage {
    RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 16, y as u8 * 16, 128, 255]))
}

fn tree(dir: &Utf8Path) -> BTreeMap<Utf8PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in dir.read_dir_utf8().unwrap() {
            let entry = entry.unwrap();
            let path = entry.path().to_path_buf();

            if path.is_dir() {
                stack.push(path);
            } else {
                let bytes = fs::read(&path).unwrap();
                files.insert(path, bytes);
            }
        }
    }

    files
}

#[test]
fn build_produces_a_deployable_tree() {
    let (_dir, site) = full_project();
    let out = site.output();

    site.clone().build().unwrap();

    assert_eq!(
        fs::read_to_string(out.join("index.html")).unwrap(),
        "<!DOCTYPE html><html><head><title>demo</title>\
         <link rel=\"stylesheet\" href=\"assets/styles/app.css\"></head>\
         <body><nav><a href=\"index.html\">Home</a><a href=\"about.html\">About</a></nav>\
         <main><p>Hello world</p></main>\
         <script src=\"assets/scripts/app.js\"></script></body></html>"
    );

    assert_eq!(
        fs::read_to_string(out.join("assets/scripts/app.js")).unwrap(),
        "var a = 1;\n\nvar b = a;"
    );
    assert_eq!(
        fs::read_to_string(out.join("assets/styles/app.css")).unwrap().trim_end(),
        "body{color:red}"
    );

    let png = image::open(out.join("assets/images/logo.png")).unwrap().to_rgba8();
    assert_eq!(png, logo());

    assert_eq!(fs::read(out.join("assets/fonts/body.woff2")).unwrap(), b"font-bytes");
    assert_eq!(fs::read(out.join("robots.txt")).unwrap(), b"User-agent: *\n");

    // layouts are templates, not pages
    assert!(!out.join("layouts").exists());
    // staging stays around for inspection
    assert!(site.staging().join("index.html").exists());
    assert!(site.staging().join("assets/styles/main.css").exists());
}

#[test]
fn repeated_builds_are_identical() {
    let (_dir, site) = full_project();

    site.clone().build().unwrap();
    let first: BTreeMap<_, _> = tree(&site.output());

    site.clone().build().unwrap();
    let second: BTreeMap<_, _> = tree(&site.output());

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn missing_reference_fails_the_build() {
    let (_dir, site) = project(&[(
        "src/index.html",
        "<body><!-- build:js app.js --><script src=\"missing.js\"></script><!-- endbuild --></body>",
    )]);

    let err = site.clone().build().unwrap_err();

    match err.root_cause() {
        BuildError::ReferenceResolution { member, searched, .. } => {
            assert_eq!(member, "missing.js");
            assert_eq!(searched.len(), 2);
        }
        other => panic!("expected a reference error, got {other:?}"),
    }

    assert!(!site.output().join("index.html").exists());
    assert!(!site.output().join("app.js").exists());
}

#[test]
fn clean_removes_generated_trees_only() {
    let (_dir, site) = full_project();

    site.clone().build().unwrap();
    tsumiki::clean(&site).unwrap();

    assert!(!site.staging().exists());
    assert!(!site.output().exists());
    assert!(site.source().join("index.html").exists());
    assert!(site.public().join("robots.txt").exists());
}
