//! End-to-end builds of small content trees through the public API.

use nocturne::config::{self, SiteConfig};
use nocturne::generate::{self, GenerateError};
use nocturne::plugin::{PluginError, Registry};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn garden() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(
        root,
        "nocturne.toml",
        "[website]\ntitle = \"Field Notes\"\n\n[build]\noutput_dir = \"public\"\n",
    );
    write(
        root,
        "index.org",
        "* Home\nWelcome to *the* garden.\n\n** Plants\n- fern\n- moss\n",
    );
    write(
        root,
        "notes/rust.org",
        "* Rust\n#+toc: on\n** Ownership\nBorrow it.\n** Lifetimes\nScope it.\n",
    );
    write(root, ".drafts/secret.org", "* Secret\nnot yet\n");
    write(root, "notes/readme.txt", "not a source\n");
    tmp
}

fn build(root: &Path) -> (SiteConfig, generate::BuildSummary) {
    let config = config::load_config(root).unwrap();
    let output_dir = generate::resolve_output_dir(root, &config);
    let summary =
        generate::build_site(root, &output_dir, &config, &Registry::empty()).unwrap();
    (config, summary)
}

#[test]
fn builds_every_source_at_its_relative_path() {
    let tmp = garden();
    let (_, summary) = build(tmp.path());

    assert!(summary.is_success());
    assert_eq!(summary.built().count(), 2);
    assert_eq!(summary.output_dir, tmp.path().join("public"));
    assert!(tmp.path().join("public/index.html").is_file());
    assert!(tmp.path().join("public/notes/rust.html").is_file());
    assert!(!tmp.path().join("public/.drafts").exists());
    assert!(!tmp.path().join("public/notes/readme.html").exists());
}

#[test]
fn page_carries_frame_inline_markup_and_tomb() {
    let tmp = garden();
    build(tmp.path());
    let html = fs::read_to_string(tmp.path().join("public/index.html")).unwrap();

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<title>Home | Field Notes</title>"));
    assert!(html.contains("<strong>the</strong>"));
    assert!(html.contains("id=\"plants\""));
    assert!(html.contains("fern"));
    assert!(html.contains(" ◼"));
}

#[test]
fn sections_are_balanced() {
    let tmp = garden();
    build(tmp.path());
    let html = fs::read_to_string(tmp.path().join("public/notes/rust.html")).unwrap();

    let opened = html.matches("<div class=\"sectionbody\">").count();
    assert_eq!(opened, 3, "toc heading plus two sections");
    assert_eq!(html.matches("<div").count(), html.matches("</div>").count());
}

#[test]
fn toc_links_every_heading() {
    let tmp = garden();
    build(tmp.path());
    let html = fs::read_to_string(tmp.path().join("public/notes/rust.html")).unwrap();

    assert!(html.contains("Table of Contents"));
    assert!(html.contains("href=\"#ownership\""));
    assert!(html.contains("href=\"#lifetimes\""));
    let toc = html.find("Table of Contents").unwrap();
    let first = html.find("id=\"ownership\"").unwrap();
    assert!(toc < first);
}

#[test]
fn heading_ids_are_unique_on_a_page() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "ids.org",
        "* Ids\n#+toc: on\n** Intro\na\n** Intro\nb\n** Intro 2\nc\n** Table of Contents\nd\n",
    );
    let (_, summary) = build(tmp.path());
    assert!(summary.is_success());
    let html = fs::read_to_string(tmp.path().join("dist/ids.html")).unwrap();

    for id in ["intro", "intro-2", "intro-2-2", "table-of-contents", "table-of-contents-2"] {
        assert_eq!(html.matches(&format!("id=\"{id}\"")).count(), 1, "{id}");
    }
}

#[test]
fn dotted_names_do_not_collide() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "notes/v1.org", "* One\nfirst\n");
    write(tmp.path(), "notes/v1.2.org", "* One point two\nsecond\n");
    let (_, summary) = build(tmp.path());

    assert_eq!(summary.built().count(), 2);
    let v1 = fs::read_to_string(tmp.path().join("dist/notes/v1.html")).unwrap();
    let v12 = fs::read_to_string(tmp.path().join("dist/notes/v1.2.html")).unwrap();
    assert!(v1.contains("first"));
    assert!(v12.contains("second"));
}

#[test]
fn sources_inside_output_dir_are_ignored() {
    let tmp = garden();
    write(tmp.path(), "public/stale.org", "* Stale\n");
    let (_, summary) = build(tmp.path());

    assert_eq!(summary.built().count(), 2);
    assert!(summary.built().all(|page| page.location.as_str() != "public/stale"));
}

#[test]
fn rebuild_is_identical() {
    let tmp = garden();
    build(tmp.path());
    let first = fs::read_to_string(tmp.path().join("public/notes/rust.html")).unwrap();
    build(tmp.path());
    let second = fs::read_to_string(tmp.path().join("public/notes/rust.html")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn render_file_uses_stock_defaults_without_config() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "hello.org", "* Hello\nplain words\n");
    let config = config::load_config(tmp.path()).unwrap();
    let output_dir = generate::resolve_output_dir(tmp.path(), &config);

    let html = generate::render_file(
        &tmp.path().join("hello.org"),
        tmp.path(),
        &output_dir,
        &config,
        &Registry::empty(),
    )
    .unwrap();

    assert!(html.contains("<title>Hello | Notes</title>"));
    assert!(html.contains("plain words"));
    assert!(!tmp.path().join("dist").exists());
}

#[test]
fn unknown_config_key_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "nocturne.toml", "[website]\ntitel = \"typo\"\n");
    assert!(config::load_config(tmp.path()).is_err());
}

#[test]
fn unknown_tool_is_reported() {
    let tmp = garden();
    let config = config::load_config(tmp.path()).unwrap();
    let output_dir = generate::resolve_output_dir(tmp.path(), &config);

    let err = generate::run_tool(
        "sitemap",
        true,
        tmp.path(),
        &output_dir,
        &config,
        &Registry::empty(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        GenerateError::Plugin(PluginError::UnknownTool(ref name)) if name == "sitemap"
    ));
    assert!(!output_dir.exists());
}
