//! `bhs-daemon check-config` validates config without touching the network.

use std::io::Write;

use assert_cmd::prelude::*;
use predicates::prelude::*;

const VALID: &str = r#"
chain:
  rpc_url: "http://127.0.0.1:8545"
feeder:
  wait_blocks: 3
  lookback_blocks: 100
archive:
  address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
  from_address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
coordinators:
  v2_address: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
"#;

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

#[test]
fn valid_config_prints_hash_and_window() -> anyhow::Result<()> {
    let base = yaml_file(VALID);
    let mut cmd = assert_cmd::Command::cargo_bin("bhs-daemon")?;
    cmd.args(["check-config", "--config"]).arg(base.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains("wait_blocks=3 lookback_blocks=100"))
        .stdout(predicate::str::contains("warning:").not());
    Ok(())
}

#[test]
fn inert_window_is_a_warning_not_an_error() -> anyhow::Result<()> {
    let base = yaml_file(VALID);
    let overlay = yaml_file("feeder:\n  lookback_blocks: 3\n");
    let mut cmd = assert_cmd::Command::cargo_bin("bhs-daemon")?;
    cmd.args(["check-config", "--config"])
        .arg(base.path())
        .arg("--config")
        .arg(overlay.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("warning: lookback_blocks (3) <= wait_blocks (3)"));
    Ok(())
}

#[test]
fn invalid_config_fails() -> anyhow::Result<()> {
    let base = yaml_file(VALID);
    let overlay = yaml_file("chain:\n  rpc_url: \"\"\n");
    let mut cmd = assert_cmd::Command::cargo_bin("bhs-daemon")?;
    cmd.args(["check-config", "--config"])
        .arg(base.path())
        .arg("--config")
        .arg(overlay.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_INVALID"));
    Ok(())
}
