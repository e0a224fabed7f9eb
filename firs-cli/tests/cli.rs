use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use firs_core::invoice::C14nMethod;
use firs_core::invoice::sign::digest_base64;

fn cli_exe() -> &'static str {
    env!("CARGO_BIN_EXE_firs-cli")
}

fn fixture(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("firs-core")
        .join("tests")
        .join("fixtures")
        .join(relative)
}

fn run(args: &[&str]) -> Output {
    Command::new(cli_exe())
        .args(args)
        .output()
        .expect("run firs-cli")
}

fn run_ok(args: &[&str]) -> String {
    let output = run(args);
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8 stdout")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

fn issue_to(dir: &Path, name: &str) -> PathBuf {
    let signed = dir.join(name);
    run_ok(&[
        "issue",
        "--request",
        path_str(&fixture("requests/inv001.json")),
        "--private-key",
        path_str(&fixture("keys/signing-key.pem")),
        "--output",
        path_str(&signed),
    ]);
    signed
}

#[test]
fn render_fills_default_template() {
    let xml = run_ok(&["render", "--request", path_str(&fixture("requests/inv001.json"))]);
    assert!(xml.contains("<cbc:ID>INV001</cbc:ID>"));
    assert!(xml.contains("Widget"));
    assert!(!xml.contains("{{#each"));
}

#[test]
fn render_remove_policy_drops_unmatched_tokens() {
    let xml = run_ok(&[
        "render",
        "--request",
        path_str(&fixture("requests/inv001.json")),
        "--template",
        path_str(&fixture("templates/simplified.xml")),
        "--unmatched",
        "remove",
    ]);
    assert!(!xml.contains("{{"));
}

#[test]
fn issued_invoice_verifies_with_each_key_source() {
    let dir = tempfile::tempdir().expect("tempdir");
    let signed = issue_to(dir.path(), "signed.xml");

    for (flag, key) in [
        ("--public-key", "keys/signing-key.pub.pem"),
        ("--private-key", "keys/signing-key.pem"),
    ] {
        let stdout = run_ok(&["verify", "--invoice", path_str(&signed), flag, path_str(&fixture(key))]);
        assert_eq!(stdout.trim(), "valid");
    }
}

#[test]
fn sign_with_certificate_verifies_against_certificate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let unsigned = dir.path().join("unsigned.xml");
    let signed = dir.path().join("signed.xml");
    run_ok(&[
        "render",
        "--request",
        path_str(&fixture("requests/full.json")),
        "--output",
        path_str(&unsigned),
    ]);
    run_ok(&[
        "sign",
        "--invoice",
        path_str(&unsigned),
        "--private-key",
        path_str(&fixture("keys/signing-key-pkcs1.pem")),
        "--certificate",
        path_str(&fixture("keys/signing-cert.pem")),
        "--c14n",
        "inclusive",
        "--output",
        path_str(&signed),
    ]);

    let xml = std::fs::read_to_string(&signed).expect("signed");
    assert!(xml.contains("<X509Certificate>"));
    let stdout = run_ok(&[
        "verify",
        "--invoice",
        path_str(&signed),
        "--certificate",
        path_str(&fixture("keys/signing-cert.pem")),
    ]);
    assert_eq!(stdout.trim(), "valid");
}

#[test]
fn verify_rejects_tampered_invoice_and_wrong_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let signed = issue_to(dir.path(), "signed.xml");

    let wrong_key = run(&[
        "verify",
        "--invoice",
        path_str(&signed),
        "--private-key",
        path_str(&fixture("keys/other-key.pem")),
    ]);
    assert!(!wrong_key.status.success());

    let tampered = dir.path().join("tampered.xml");
    let xml = std::fs::read_to_string(&signed).expect("signed");
    std::fs::write(&tampered, xml.replace(">Beta<", ">Gamma<")).expect("write");
    let output = run(&[
        "verify",
        "--invoice",
        path_str(&tampered),
        "--public-key",
        path_str(&fixture("keys/signing-key.pub.pem")),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed verification"));

    let no_key = run(&["verify", "--invoice", path_str(&signed)]);
    assert!(!no_key.status.success());
}

#[test]
fn digest_matches_library() {
    let dir = tempfile::tempdir().expect("tempdir");
    let signed = issue_to(dir.path(), "signed.xml");
    let xml = std::fs::read_to_string(&signed).expect("signed");

    for (flag, method) in [("exclusive", C14nMethod::Exclusive), ("inclusive", C14nMethod::Inclusive)] {
        let stdout = run_ok(&["digest", "--invoice", path_str(&signed), "--c14n", flag]);
        assert_eq!(stdout.trim(), digest_base64(&xml, method).expect("digest"));
    }
}

#[test]
fn view_prints_html_and_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let signed = issue_to(dir.path(), "signed.xml");

    let html = run_ok(&["view", "--invoice", path_str(&signed)]);
    for expected in ["Acme", "Beta", "1000.00", "Widget", "/invoice/pdf/INV001"] {
        assert!(html.contains(expected), "missing {expected}");
    }

    let json = run_ok(&["view", "--invoice", path_str(&signed), "--json"]);
    let model: serde_json::Value = serde_json::from_str(&json).expect("json");
    assert_eq!(model["irn"], "INV001");
    assert_eq!(model["supplier"]["name"], "Acme");
    assert_eq!(model["lines"].as_array().map(Vec::len), Some(1));
}

#[test]
fn qr_prints_base64_png() {
    let stdout = run_ok(&["qr", "--data", "http://localhost:3000/invoice/view/INV001"]);
    // base64 of the PNG signature bytes
    assert!(stdout.trim().starts_with("iVBORw0KGgo"));
}

#[test]
fn missing_request_file_fails() {
    let output = run(&["render", "--request", "/nonexistent/request.json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read"));
}
