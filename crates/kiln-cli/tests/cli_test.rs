use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_init_and_build() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().to_str().unwrap();

    // Init project
    cargo_bin_cmd!("kiln")
        .args(["init", project, "--name", "demo"])
        .assert()
        .success();

    // Verify generated files exist
    assert!(dir.path().join("kiln.yaml").exists());
    assert!(dir.path().join("src/index.js").exists());
    assert!(dir.path().join("src/style.css").exists());
    assert!(dir.path().join("src/index.html").exists());
    assert!(dir.path().join(".gitignore").exists());

    // Validate
    cargo_bin_cmd!("kiln")
        .args(["--config", project, "validate"])
        .assert()
        .success();

    // Build
    cargo_bin_cmd!("kiln")
        .args(["--config", project, "build", "--mode", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("src/index.js"))
        .stdout(predicate::str::contains("src/style.css"));

    // Verify the manifest and the files it points at
    let dist = dir.path().join("dist");
    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dist.join("manifest.json")).unwrap()).unwrap();
    let entries = manifest.as_object().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries.values() {
        let output = entry["outputPath"].as_str().unwrap();
        assert!(dist.join(output).is_file(), "{output} should exist");
    }

    let style = entries["src/style.css"]["outputPath"].as_str().unwrap();
    let css = std::fs::read_to_string(dist.join(style)).unwrap();
    assert!(css.contains("-webkit-user-select:none"));

    let html = std::fs::read_to_string(dist.join("index.html")).unwrap();
    assert!(html.contains("<title>demo</title>"));
    assert!(html.contains(style));

    // Status reads the last manifest
    cargo_bin_cmd!("kiln")
        .args(["--config", project, "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Last build: 2 assets"));

    // Clean removes the output directory
    cargo_bin_cmd!("kiln")
        .args(["--config", project, "clean"])
        .assert()
        .success();
    assert!(!dist.exists());
}

#[test]
fn test_build_without_plugins() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().to_str().unwrap();

    cargo_bin_cmd!("kiln").args(["init", project]).assert().success();
    cargo_bin_cmd!("kiln")
        .args(["--config", project, "build", "--no-plugins", "--output-dir", "out"])
        .assert()
        .success();

    let out = dir.path().join("out");
    assert!(out.join("manifest.json").exists());
    assert!(!out.join("index.html").exists());
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_init_refuses_existing_project() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().to_str().unwrap();

    cargo_bin_cmd!("kiln").args(["init", project]).assert().success();
    cargo_bin_cmd!("kiln")
        .args(["init", project])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already contains a kiln.yaml"));
}

#[test]
fn test_build_reports_cycle() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kiln.yaml"), "entry: ./a.js\n").unwrap();
    std::fs::write(dir.path().join("a.js"), "import './b.js';").unwrap();
    std::fs::write(dir.path().join("b.js"), "import './a.js';").unwrap();

    cargo_bin_cmd!("kiln")
        .args(["--config", dir.path().to_str().unwrap(), "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reference cycle detected"));
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_validate_rejects_unknown_stage() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("kiln.yaml"),
        "entry: ./a.js\nrules:\n  - test: '\\.js$'\n    stages: [babel]\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("a.js"), "1").unwrap();

    cargo_bin_cmd!("kiln")
        .args(["--config", dir.path().to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown stage 'babel'"));
}

#[test]
fn test_invalid_mode_is_rejected() {
    cargo_bin_cmd!("kiln")
        .args(["build", "--mode", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode 'staging'"));
}

#[test]
fn test_build_refuses_output_dir_over_project() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().to_str().unwrap();

    cargo_bin_cmd!("kiln").args(["init", project]).assert().success();
    cargo_bin_cmd!("kiln")
        .args(["--config", project, "build", "--output-dir", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not be the project root"));

    assert!(dir.path().join("kiln.yaml").is_file());
    assert!(dir.path().join("src/index.js").is_file());
}

#[test]
fn test_clean_refuses_output_dir_holding_entry() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("kiln.yaml"),
        "entry: ./src/index.js\noutput_dir: src\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("src/index.js"), "run();").unwrap();

    cargo_bin_cmd!("kiln")
        .args(["--config", dir.path().to_str().unwrap(), "clean"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not contain the entry point"));
    assert!(dir.path().join("src/index.js").is_file());
}

#[test]
fn test_verbose_build_warns_about_unmatched_assets() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().to_str().unwrap();
    std::fs::write(dir.path().join("kiln.yaml"), "entry: ./a.js\n").unwrap();
    std::fs::write(dir.path().join("a.js"), "import './data.json';").unwrap();
    std::fs::write(dir.path().join("data.json"), "{}").unwrap();

    cargo_bin_cmd!("kiln")
        .args(["--config", project, "--verbose", "build"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No rule matched data.json, copied unchanged"));

    cargo_bin_cmd!("kiln")
        .args(["--config", project, "build"])
        .assert()
        .success()
        .stderr(predicate::str::contains("copied unchanged").not());
}
