use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const REVISION: &str = "Tue Aug 20 09:18:41 IST 2013  abc@example.com";

fn worksync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("worksync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("RUST_LOG", "warn");
    cmd
}

fn write_step(home: &Path, name: &str, yaml: &str) -> PathBuf {
    let path = home.join(".worksync/steps").join(format!("{name}.yaml"));
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, yaml).expect("write step");
    path
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, body).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
}

/// A `darcs` stand-in: `get` creates `<repo-name>/_darcs`, `changes` prints
/// the revision in `$FAKE_DARCS_REVISION`.
#[cfg(unix)]
fn fake_darcs(dir: &Path) -> String {
    write_script(
        &dir.join("darcs"),
        r#"#!/bin/sh
case "$1" in
  --version) echo "2.16.5 (release)" ;;
  get)
    dest=""
    while [ $# -gt 0 ]; do
      case "$1" in
        --repo-name) dest="$2"; shift 2 ;;
        --context) shift 2 ;;
        *) shift ;;
      esac
    done
    mkdir -p "$dest/_darcs"
    ;;
  pull) echo "No remote patches to pull in!" ;;
  changes) printf '%s\n' "$FAKE_DARCS_REVISION" ;;
  *) exit 2 ;;
esac
"#,
    );
    format!(
        "{}:{}",
        dir.display(),
        std::env::var("PATH").unwrap_or_default()
    )
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

#[test]
fn plan_lists_probes_and_actions() {
    let home = TempDir::new().expect("home");
    write_step(home.path(), "trunk", "repourl: http://localhost/darcs\nmode: full\nmethod: clobber\n");

    worksync_cmd(home.path())
        .args(["plan", "trunk"])
        .assert()
        .success()
        .stdout(contains("probe version"))
        .stdout(contains("remove workdir"))
        .stdout(contains("clone workdir"))
        .stdout(contains("query revision"));
}

#[test]
fn plan_json_for_patched_incremental_workdir() {
    let home = TempDir::new().expect("home");
    let step = write_step(home.path(), "inc", "repourl: http://localhost/darcs\n");

    let output = worksync_cmd(home.path())
        .args(["plan", "--file"])
        .arg(&step)
        .args(["--patched", "--revision", "abc", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let ops: Vec<&str> = json["operations"]
        .as_array()
        .expect("operations")
        .iter()
        .map(|op| op["op"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(
        ops,
        ["probe_version", "probe_marker", "remove_workdir", "clone_workdir", "query_revision"]
    );
    assert_eq!(json["mode"], "incremental");
}

#[test]
fn plan_for_full_copy_removes_before_reference_sync() {
    let home = TempDir::new().expect("home");
    write_step(home.path(), "copy", "repourl: http://localhost/darcs\nmode: full\nmethod: copy\n");

    let output = worksync_cmd(home.path())
        .args(["plan", "copy", "--reference-metadata", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let ops: Vec<&str> = json["operations"]
        .as_array()
        .expect("operations")
        .iter()
        .map(|op| op["op"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(
        ops,
        [
            "probe_version",
            "probe_marker",
            "remove_workdir",
            "pull_reference",
            "copy_reference_to_workdir",
            "query_revision"
        ]
    );
}

#[test]
fn invalid_step_config_is_reported() {
    let home = TempDir::new().expect("home");
    write_step(home.path(), "bad", "repourl: http://localhost/darcs\nmode: incremental\nmethod: copy\n");

    worksync_cmd(home.path())
        .args(["plan", "bad"])
        .assert()
        .failure()
        .stderr(contains("failed to load step 'bad'"));
}

#[test]
fn missing_step_is_reported() {
    let home = TempDir::new().expect("home");

    worksync_cmd(home.path())
        .args(["sync", "nope"])
        .assert()
        .code(1)
        .stderr(contains("nope"));
}

// ---------------------------------------------------------------------------
// sync, against a fake darcs
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn sync_clones_then_pulls() {
    let home = TempDir::new().expect("home");
    let base = TempDir::new().expect("base");
    let bin = TempDir::new().expect("bin");
    let path = fake_darcs(bin.path());
    write_step(home.path(), "inc", "repourl: http://localhost/darcs\nworkdir: wkdir\n");

    worksync_cmd(home.path())
        .env("PATH", &path)
        .env("FAKE_DARCS_REVISION", REVISION)
        .args(["sync", "inc", "--base-dir"])
        .arg(base.path())
        .assert()
        .success()
        .stdout(contains(REVISION))
        .stdout(contains("clone workdir"));
    assert!(base.path().join("wkdir/_darcs").is_dir());

    let output = worksync_cmd(home.path())
        .env("PATH", &path)
        .env("FAKE_DARCS_REVISION", REVISION)
        .args(["sync", "inc", "--json", "--base-dir"])
        .arg(base.path())
        .output()
        .expect("run");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["outcome"]["result"], "success");
    assert_eq!(report["outcome"]["revision"], REVISION);
    assert_eq!(report["plan"]["actions"][0]["op"], "pull_in_place");
}

#[cfg(unix)]
#[test]
fn sync_applies_patch_and_writes_report() {
    let home = TempDir::new().expect("home");
    let base = TempDir::new().expect("base");
    let bin = TempDir::new().expect("bin");
    let path = fake_darcs(bin.path());
    write_script(&bin.path().join("patch"), "#!/bin/sh\nexit 0\n");
    write_step(home.path(), "inc", "repourl: http://localhost/darcs\nworkdir: wkdir\n");
    let diff = base.path().join("fix.diff");
    fs::write(&diff, "--- a/x\n+++ b/x\n").expect("diff");
    let report = base.path().join("reports/last.json");

    worksync_cmd(home.path())
        .env("PATH", &path)
        .env("FAKE_DARCS_REVISION", REVISION)
        .args(["sync", "inc", "--patch"])
        .arg(&diff)
        .arg("--report")
        .arg(&report)
        .arg("--base-dir")
        .arg(base.path())
        .assert()
        .success()
        .stdout(contains("patch sha256"));

    assert!(base.path().join("wkdir/.buildbot-patched").exists());
    assert!(!base.path().join("wkdir/.buildbot-diff").exists());
    let written = fs::read_to_string(&report).expect("report");
    assert!(written.contains("\"apply patch\""));
}

#[cfg(unix)]
#[test]
fn empty_revision_exits_with_failure() {
    let home = TempDir::new().expect("home");
    let base = TempDir::new().expect("base");
    let bin = TempDir::new().expect("bin");
    let path = fake_darcs(bin.path());
    write_step(home.path(), "inc", "repourl: http://localhost/darcs\n");

    worksync_cmd(home.path())
        .env("PATH", &path)
        .env("FAKE_DARCS_REVISION", "")
        .args(["sync", "inc", "--base-dir"])
        .arg(base.path())
        .assert()
        .code(1)
        .stdout(contains("no output"));
}

#[cfg(unix)]
#[test]
fn failing_version_probe_asks_for_retry() {
    let home = TempDir::new().expect("home");
    let base = TempDir::new().expect("base");
    let bin = TempDir::new().expect("bin");
    write_script(&bin.path().join("darcs"), "#!/bin/sh\necho 'darcs: broken' >&2\nexit 1\n");
    let path = format!("{}:{}", bin.path().display(), std::env::var("PATH").unwrap_or_default());
    write_step(
        home.path(),
        "inc",
        "repourl: http://localhost/darcs\nretry:\n  interval_secs: 0\n  count: 2\n",
    );

    worksync_cmd(home.path())
        .env("PATH", &path)
        .args(["sync", "inc", "--json", "--base-dir"])
        .arg(base.path())
        .assert()
        .code(75)
        .stdout(contains("\"attempts\": 3"))
        .stdout(contains("darcs: broken"));
}

// ---------------------------------------------------------------------------
// poll
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn poll_once_prints_and_records_event() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let script = work.path().join("listing.sh");
    write_script(
        &script,
        "#!/bin/sh\necho \"syncing $1 into $2\"\necho foo-1.0_1.x86_64.xbps\necho bar-2.0_1.i686.xbps\n",
    );
    let mirror = work.path().join("mirror.yaml");
    fs::write(
        &mirror,
        format!(
            "rsync_url: rsync://mirror/current\nlocal_dir: /srv/xbps\narch: x86_64\nlisting_command: {}\n",
            script.display()
        ),
    )
    .expect("mirror");
    let output = work.path().join("changes.jsonl");

    worksync_cmd(home.path())
        .args(["poll", "--once", "--file"])
        .arg(&mirror)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(contains("srcpkgs/foo/template"))
        .stdout(contains("srcpkgs/bar/template").not());

    let lines = fs::read_to_string(&output).expect("changes");
    assert_eq!(lines.lines().count(), 1);
    assert!(lines.contains("\"poller\":\"x86_64 rsync://mirror/current\""));
}
