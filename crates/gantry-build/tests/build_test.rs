use std::path::{Path, PathBuf};

use gantry_build::{
    BuildContext, BuildRecipe, ContextError, ContextRules, DockerfileGenerator, content_tag,
};
use tempfile::TempDir;

fn default_rules() -> ContextRules {
    ContextRules::new(
        vec!["src".to_owned(), "Cargo.toml".to_owned(), "Cargo.lock".to_owned()],
        vec!["ci".to_owned(), "target".to_owned()],
    )
}

fn default_recipe() -> BuildRecipe {
    BuildRecipe {
        app_name: "fantasy-api".to_owned(),
        base_image: "rust:1.73".to_owned(),
        platform: "linux/amd64".to_owned(),
        binary: None,
        dockerfile: None,
    }
}

/// Minimal Rust project plus files the default rules must leave out.
fn write_project(dir: &Path) {
    std::fs::create_dir_all(dir.join("src/handlers")).unwrap();
    std::fs::create_dir_all(dir.join("target/release")).unwrap();
    std::fs::create_dir_all(dir.join("ci")).unwrap();
    std::fs::write(dir.join("Cargo.toml"), "[package]\nname = \"fantasy-api\"").unwrap();
    std::fs::write(dir.join("Cargo.lock"), "# lock").unwrap();
    std::fs::write(dir.join("src/main.rs"), "fn main() {}").unwrap();
    std::fs::write(dir.join("src/handlers/mod.rs"), "pub fn hello() {}").unwrap();
    std::fs::write(dir.join("target/release/fantasy-api"), "binary").unwrap();
    std::fs::write(dir.join("ci/main.go"), "package main").unwrap();
    std::fs::write(dir.join("README.md"), "# readme").unwrap();
}

// ── Build Context Tests ──

#[test]
fn context_contains_exactly_included_files() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());

    let ctx = BuildContext::collect(tmp.path(), &default_rules()).unwrap();

    assert_eq!(
        ctx.files(),
        &[
            PathBuf::from("Cargo.lock"),
            PathBuf::from("Cargo.toml"),
            PathBuf::from("src/handlers/mod.rs"),
            PathBuf::from("src/main.rs"),
        ]
    );
    assert!(ctx.path().join("src/main.rs").exists());
    assert!(!ctx.path().join("README.md").exists());
    assert!(!ctx.path().join("target").exists());
    assert!(!ctx.path().join("ci").exists());
}

#[test]
fn exclude_removes_included_subtree() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());
    let rules = ContextRules::new(vec!["src".to_owned()], vec!["src/handlers".to_owned()]);

    let ctx = BuildContext::collect(tmp.path(), &rules).unwrap();

    assert_eq!(ctx.files(), &[PathBuf::from("src/main.rs")]);
    assert!(ctx.contains(Path::new("src/main.rs")));
    assert!(!ctx.contains(Path::new("src/handlers/mod.rs")));
}

#[test]
fn snapshot_is_isolated_from_later_host_changes() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());

    let ctx = BuildContext::collect(tmp.path(), &default_rules()).unwrap();
    std::fs::write(tmp.path().join("src/main.rs"), "fn main() { changed() }").unwrap();
    std::fs::remove_file(tmp.path().join("Cargo.lock")).unwrap();

    let snapshot = std::fs::read_to_string(ctx.path().join("src/main.rs")).unwrap();
    assert_eq!(snapshot, "fn main() {}");
    assert!(ctx.path().join("Cargo.lock").exists());
}

#[test]
fn unreadable_root_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("does-not-exist");

    let err = BuildContext::collect(&missing, &default_rules()).unwrap_err();
    assert!(matches!(err, ContextError::RootUnreadable { .. }));
}

#[test]
fn staging_is_removed_on_drop_and_release() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());

    let ctx = BuildContext::collect(tmp.path(), &default_rules()).unwrap();
    let staging = ctx.path().to_path_buf();
    drop(ctx);
    assert!(!staging.exists());

    let ctx = BuildContext::collect(tmp.path(), &default_rules()).unwrap();
    let staging = ctx.path().to_path_buf();
    ctx.release().unwrap();
    assert!(!staging.exists());
}

#[test]
fn fingerprint_is_stable_for_identical_sources() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    write_project(a.path());
    write_project(b.path());

    let ctx_a = BuildContext::collect(a.path(), &default_rules()).unwrap();
    let ctx_b = BuildContext::collect(b.path(), &default_rules()).unwrap();

    assert_eq!(ctx_a.fingerprint(), ctx_b.fingerprint());
    assert_eq!(ctx_a.fingerprint().len(), 64);
}

#[test]
fn fingerprint_changes_with_content() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    write_project(a.path());
    write_project(b.path());
    std::fs::write(b.path().join("src/main.rs"), "fn main() { println!() }").unwrap();

    let ctx_a = BuildContext::collect(a.path(), &default_rules()).unwrap();
    let ctx_b = BuildContext::collect(b.path(), &default_rules()).unwrap();

    assert_ne!(ctx_a.fingerprint(), ctx_b.fingerprint());
}

#[test]
fn fingerprint_ignores_excluded_files() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    write_project(a.path());
    write_project(b.path());
    std::fs::write(b.path().join("target/release/fantasy-api"), "other binary").unwrap();
    std::fs::write(b.path().join("README.md"), "# changed").unwrap();

    let ctx_a = BuildContext::collect(a.path(), &default_rules()).unwrap();
    let ctx_b = BuildContext::collect(b.path(), &default_rules()).unwrap();

    assert_eq!(ctx_a.fingerprint(), ctx_b.fingerprint());
}

#[test]
fn fingerprint_depends_on_paths() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    write_project(a.path());
    write_project(b.path());
    std::fs::rename(b.path().join("src/handlers/mod.rs"), b.path().join("src/handlers/lib.rs"))
        .unwrap();

    let ctx_a = BuildContext::collect(a.path(), &default_rules()).unwrap();
    let ctx_b = BuildContext::collect(b.path(), &default_rules()).unwrap();

    assert_ne!(ctx_a.fingerprint(), ctx_b.fingerprint());
}

// ── Dockerfile Generation Tests ──

#[test]
fn dockerfile_pins_platform_and_toolchain() {
    let recipe = default_recipe();
    let output = DockerfileGenerator::new(&recipe, "fantasy-api").render();

    assert!(output.starts_with("FROM --platform=linux/amd64 rust:1.73\n"));
    assert!(output.contains("WORKDIR /fantasy-api"));
}

#[test]
fn dockerfile_builds_release_and_sets_entrypoint() {
    let recipe = default_recipe();
    let output = DockerfileGenerator::new(&recipe, "server").render();

    assert!(output.contains("RUN cargo build --release --bin server"));
    assert!(output.contains(r#"ENTRYPOINT ["./target/release/server"]"#));

    let build = output.find("RUN cargo build").unwrap();
    let entry = output.find("ENTRYPOINT").unwrap();
    assert!(build < entry, "entrypoint must follow the build step");
}

#[test]
fn dockerfile_uses_custom_base_image() {
    let recipe = BuildRecipe {
        base_image: "rust:1.80-bookworm".to_owned(),
        platform: "linux/arm64".to_owned(),
        ..default_recipe()
    };
    let output = DockerfileGenerator::new(&recipe, "api").render();

    assert!(output.contains("FROM --platform=linux/arm64 rust:1.80-bookworm"));
}

#[test]
fn content_tag_tracks_every_input() {
    let base = content_tag("fp", "FROM a", "linux/amd64");

    assert_eq!(base, content_tag("fp", "FROM a", "linux/amd64"));
    assert_ne!(base, content_tag("fp2", "FROM a", "linux/amd64"));
    assert_ne!(base, content_tag("fp", "FROM b", "linux/amd64"));
    assert_ne!(base, content_tag("fp", "FROM a", "linux/arm64"));
}
