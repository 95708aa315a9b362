//! CLI integration tests
//!
//! Each test runs the `strata` binary inside a temporary project with HOME
//! pointed at the project so no user configuration leaks in.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

const PROJECT: &str = r#"
[project]
name = "sponge"
version = "1.0.0"

[variants.common.layers.applaunch]
libraries = ["boot"]

[variants.common.layers.main]
outputs = ["applaunch"]
libraries = ["game"]

[variants.common.libraries.boot]
artifacts = ["org.example:foo:1.0"]

[variants.common.libraries.game]
artifacts = ["org.example:bar:2.0"]

[variants.common.bundles.jar]
layers = ["applaunch", "main"]

[variants.common.bundles.shaded]
classifier = "all"
layers = ["main"]
shade = ["boot", "game"]
"#;

fn create_project(manifest: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("strata.toml"), manifest).unwrap();

    let class = root.join("build/classes/common/main/org/spongepowered/Sponge.class");
    fs::create_dir_all(class.parent().unwrap()).unwrap();
    fs::write(class, b"sponge").unwrap();

    write_jar(&root.join("repository/org/example/foo/1.0/foo-1.0.jar"), "org/example/Foo.class");
    write_jar(&root.join("repository/org/example/bar/2.0/bar-2.0.jar"), "org/example/Bar.class");
    dir
}

fn write_jar(path: &Path, entry: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    zip.start_file(entry, FileOptions::default()).unwrap();
    zip.write_all(b"class").unwrap();
    zip.finish().unwrap();
}

fn strata_cmd(project: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("strata").unwrap();
    cmd.current_dir(project.path())
        .env("HOME", project.path())
        .env_remove("RUST_LOG")
        .env_remove("STRATA_JSON")
        .env_remove("STRATA_MANIFEST")
        .env_remove("STRATA_REPOSITORY")
        .env_remove("STRATA_OUTPUT_DIR")
        .env_remove("STRATA_CLASSES_DIR")
        .env_remove("STRATA_STRICT_VERSIONS");
    cmd
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("strata")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("classpath"))
        .stdout(predicate::str::contains("order"));
}

#[test]
fn test_build_writes_archives() {
    let project = create_project(PROJECT);
    strata_cmd(&project)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Built 2 bundles"));

    assert!(project.path().join("build/libs/sponge-common-1.0.0.jar").is_file());
    assert!(project.path().join("build/libs/sponge-common-1.0.0-all.jar").is_file());
}

#[test]
fn test_build_json_output() {
    let project = create_project(PROJECT);
    let output = strata_cmd(&project)
        .args(["build", "--bundle", "common:jar", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["bundles"].as_array().unwrap().len(), 1);
    assert_eq!(json["bundles"][0]["name"], "common:jar");
    assert_eq!(json["bundles"][0]["kind"], "plain");
}

#[test]
fn test_explicit_manifest_path() {
    let project = create_project(PROJECT);
    let elsewhere = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("strata").unwrap();
    cmd.current_dir(elsewhere.path())
        .env("HOME", project.path())
        .args(["check", "--manifest"])
        .arg(project.path().join("strata.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: 1 variants, 2 layers, 2 bundles"));
}

#[test]
fn test_verbose_logs_loaded_manifest() {
    let project = create_project(PROJECT);
    strata_cmd(&project)
        .args(["-v", "check"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Loaded sponge 1.0.0 from"));

    strata_cmd(&project)
        .arg("check")
        .assert()
        .success()
        .stderr(predicate::str::contains("Loaded").not());
}

#[test]
fn test_classpath_lists_layers_and_libraries() {
    let project = create_project(PROJECT);
    strata_cmd(&project)
        .args(["classpath", "common:main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("layer   common:applaunch"))
        .stdout(predicate::str::contains("library org.example:bar:2.0"))
        .stdout(predicate::str::contains("library org.example:foo:1.0"));
}

#[test]
fn test_classpath_file_names() {
    let project = create_project(PROJECT);
    strata_cmd(&project)
        .args(["classpath", "common:main", "--runtime", "--file-names"])
        .assert()
        .success()
        .stdout("bar-2.0.jar;foo-1.0.jar\n");
}

#[test]
fn test_classpath_requires_qualified_layer() {
    let project = create_project(PROJECT);
    strata_cmd(&project)
        .args(["classpath", "main"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("VARIANT:LAYER"));
}

#[test]
fn test_order_prints_groups() {
    let project = create_project(PROJECT);
    strata_cmd(&project)
        .arg("order")
        .assert()
        .success()
        .stdout(predicate::str::contains("1: common:applaunch"))
        .stdout(predicate::str::contains("2: common:main"))
        .stdout(predicate::str::contains("1: common:jar, common:shaded"));
}

#[test]
fn test_cycle_exits_with_validation_code() {
    let project = create_project(
        r#"
[project]
name = "sponge"
version = "1.0.0"

[variants.common.layers.a]
outputs = ["b"]

[variants.common.layers.b]
outputs = ["a"]
"#,
    );
    strata_cmd(&project)
        .arg("check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Circular layer dependency"));
}

#[test]
fn test_invalid_manifest_exits_with_validation_code() {
    let project = create_project("[project]\nname = \"\"\nversion = \"1.0.0\"\n");
    strata_cmd(&project)
        .arg("build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid manifest"));
}

#[test]
fn test_missing_artifact_exits_with_io_code() {
    let project = create_project(PROJECT);
    fs::remove_file(project.path().join("repository/org/example/bar/2.0/bar-2.0.jar")).unwrap();
    strata_cmd(&project)
        .arg("build")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("org.example:bar:2.0"));
}
