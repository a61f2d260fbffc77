use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

fn wikipad_bin() -> PathBuf {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_wikipad") {
        return PathBuf::from(bin);
    }

    let mut path = std::env::current_exe().unwrap();
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("wikipad");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    path
}

fn run(data_dir: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(wikipad_bin())
        .args(args)
        .env("WIKIPAD_DATA_DIR", data_dir)
        .env("WIKIPAD_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    {
        let mut pipe = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).unwrap();
        }
    }
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn page_put_get_search() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();

    let page = "<!-- wikipad header\ntitle = \"Ferris\"\ntags = [\"crab\"]\n-->\n\nFerris is the Rust mascot.\n";
    stdout(&run(dir, &["page", "put", "ferris"], Some(page)));

    let raw = stdout(&run(dir, &["page", "get", "ferris", "--raw"], None));
    assert_eq!(raw, page);

    let json = stdout(&run(dir, &["page", "get", "ferris", "--json"], None));
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["metadata"]["title"], "Ferris");
    assert!(value["metadata"]["modified"].is_string());

    let results =
        stdout(&run(dir, &["search", "mascot", "--json"], None));
    let value: serde_json::Value = serde_json::from_str(&results).unwrap();
    assert_eq!(value["total"], 1);
    assert_eq!(value["hits"][0]["id"], "ferris");

    let tags = stdout(&run(dir, &["tags"], None));
    assert!(tags.contains("crab"));
}

#[test]
fn invalid_pagination_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let output = run(tmp.path(), &["search", "x", "--size", "ten"], None);
    assert!(!output.status.success());
}

#[test]
fn missing_page_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let output = run(tmp.path(), &["page", "get", "nope"], None);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}

#[test]
fn user_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();

    stdout(&run(dir, &["user", "add", "ann", "--admin"], Some("s3cret\n")));
    let verified = stdout(&run(
        dir,
        &["user", "verify", "ann", "--password", "s3cret"],
        None,
    ));
    assert_eq!(verified.trim(), "ok (admin)");

    let wrong = run(dir, &["user", "verify", "ann", "--password", "nope"], None);
    assert!(!wrong.status.success());

    let list = stdout(&run(dir, &["user", "list", "--json"], None));
    assert!(list.contains("\"ann\""));
    assert!(!list.contains("salt"));

    stdout(&run(dir, &["user", "remove", "ann"], None));
    assert!(!run(dir, &["user", "remove", "ann"], None).status.success());
}

#[test]
fn admin_is_bootstrapped_from_config() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        "admin_username = \"root\"\nadmin_password = \"hunter2\"\n",
    )
    .unwrap();

    let verified = stdout(&run(
        tmp.path(),
        &["user", "verify", "root", "--password", "hunter2"],
        None,
    ));
    assert_eq!(verified.trim(), "ok (admin)");
}

#[test]
fn default_admin_exists_on_first_run() {
    let tmp = tempfile::tempdir().unwrap();
    let verified = stdout(&run(
        tmp.path(),
        &["user", "verify", "admin", "--password", "admin"],
        None,
    ));
    assert_eq!(verified.trim(), "ok (admin)");
}

#[test]
fn search_accepts_huge_page_size() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    stdout(&run(dir, &["page", "put", "a"], Some("needle")));

    let size = usize::MAX.to_string();
    let results = stdout(&run(
        dir,
        &["search", "needle", "--size", &size, "--json"],
        None,
    ));
    let value: serde_json::Value = serde_json::from_str(&results).unwrap();
    assert_eq!(value["total"], 1);
    assert_eq!(value["hits"][0]["id"], "a");
}

#[test]
fn list_filters_with_glob() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    for slug in ["notes-a", "notes-b", "todo"] {
        stdout(&run(dir, &["page", "put", slug], Some("body")));
    }

    let listed = stdout(&run(dir, &["page", "list", "--glob", "notes-*"], None));
    assert_eq!(listed, "notes-a\nnotes-b\n");
}

#[test]
fn check_reports_consistent_store() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    stdout(&run(dir, &["page", "put", "a"], Some("alpha")));

    let report = stdout(&run(dir, &["check", "--json"], None));
    let value: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(value["missing"], serde_json::json!([]));
    assert_eq!(value["orphaned"], serde_json::json!([]));
}

#[test]
fn check_fails_on_drift_until_repaired() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    stdout(&run(dir, &["page", "put", "a"], Some("alpha")));
    std::fs::remove_dir_all(dir.join("index")).unwrap();

    let drifted = run(dir, &["check"], None);
    assert!(!drifted.status.success());
    let stderr = String::from_utf8_lossy(&drifted.stderr);
    assert!(stderr.contains("check --repair"), "{stderr}");

    stdout(&run(dir, &["check", "--repair"], None));
    stdout(&run(dir, &["check"], None));
}

#[test]
fn sync_once_imports_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let pages = tempfile::tempdir().unwrap();
    std::fs::write(pages.path().join("hello.md"), "Hello from disk").unwrap();

    let pages_arg = pages.path().to_str().unwrap();
    stdout(&run(tmp.path(), &["sync", pages_arg, "--once"], None));

    let listed = stdout(&run(tmp.path(), &["page", "list"], None));
    assert_eq!(listed, "hello\n");
}
