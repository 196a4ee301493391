use assert_cmd::Command;

#[test]
fn rejects_unknown_dataset_value() {
    let mut cmd = Command::cargo_bin("stellar-ledger-indexer").unwrap();
    cmd.args(["--dataset", "not-a-real-dataset"]);
    cmd.assert().failure();
}

#[test]
fn prints_version() {
    let mut cmd = Command::cargo_bin("stellar-ledger-indexer").unwrap();
    cmd.arg("--version");
    cmd.assert().success();
}

#[test]
fn missing_config_file_fails_with_nonzero_exit() {
    let mut cmd = Command::cargo_bin("stellar-ledger-indexer").unwrap();
    cmd.args(["--config-file", "/nonexistent/config.toml"]);
    cmd.assert().failure();
}
