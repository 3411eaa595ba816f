use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The binary with no Directus settings inherited from the developer's environment.
fn cms_sync(cwd: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("cms-sync").expect("Binary exists");
    cmd.current_dir(cwd)
        .env_remove("DIRECTUS_TOKEN")
        .env_remove("DIRECTUS_USER_EMAIL")
        .env_remove("DIRECTUS_USER_PASSWORD")
        .env_remove("DIRECTUS_USER_OTP")
        .env_remove("DIRECTUS_HOST")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn only_and_except_are_mutually_exclusive() {
    let cwd = tempdir().unwrap();
    cms_sync(cwd.path())
        .args(["apply", "--only", "schema", "--except", "folders"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn unknown_kind_is_rejected_with_allowed_values() {
    let cwd = tempdir().unwrap();
    cms_sync(cwd.path())
        .args(["snapshot", "--only", "schema,roles"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Unknown resource kind 'roles'. Allowed values are: schema, translations, permissions, folders",
        ));
}

#[test]
fn scalar_roles_filter_is_rejected_before_connecting() {
    let cwd = tempdir().unwrap();
    cms_sync(cwd.path())
        .args(["snapshot", "--roles-filter", "\"admin\"", "--host", "http://127.0.0.1:1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid filter"))
        .stderr(predicate::str::contains("Connection refused").not());
}

#[test]
fn missing_snapshot_files_fail_each_kind() {
    let cwd = tempdir().unwrap();
    cms_sync(cwd.path())
        .args(["apply", "--token", "t", "--src", "nowhere", "--only", "folders,schema"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Reading snapshots..."))
        .stdout(predicate::str::contains("Done!").not())
        .stderr(predicate::str::contains("[schema] Apply operation failed: could not read"))
        .stderr(predicate::str::contains("[folders] Apply operation failed: could not read"));
}

#[test]
fn unreachable_host_is_reported_per_kind() {
    let cwd = tempdir().unwrap();
    cms_sync(cwd.path())
        .args(["snapshot", "--token", "t", "--host", "http://127.0.0.1:1", "--only", "schema"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "[schema] Snapshot operation failed: Connection refused on host 'http://127.0.0.1:1'",
        ));
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_credentials_are_reported_plainly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "admin@example.com", "password": "wrong" })))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "message": "Invalid user credentials.", "extensions": { "code": "INVALID_CREDENTIALS" } }]
        })))
        .mount(&server)
        .await;

    let cwd = tempdir().unwrap();
    cms_sync(cwd.path())
        .args(["snapshot", "--host", &server.uri()])
        .env("DIRECTUS_USER_EMAIL", "admin@example.com")
        .env("DIRECTUS_USER_PASSWORD", "wrong")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid credentials"));
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_writes_one_document_per_requested_kind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schema/snapshot"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "version": 1 } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/translations"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": 2, "key": "b", "language": "en-US", "value": "B" },
                { "id": 1, "key": "a", "language": "en-US", "value": "A" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/translations"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let cwd = tempdir().unwrap();
    cms_sync(cwd.path())
        .args(["snapshot", "--host", &server.uri(), "--dest", "out", "--only", "schema,translations"])
        .env("DIRECTUS_TOKEN", "secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generating snapshots..."))
        .stdout(predicate::str::contains("  [translations] OK"))
        .stdout(predicate::str::contains("Done!"));

    let schema = std::fs::read_to_string(cwd.path().join("out/schema.json")).unwrap();
    assert_eq!(schema, "{\n  \"version\": 1\n}\n");
    let translations: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(cwd.path().join("out/translations.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        translations,
        json!([
            { "key": "a", "language": "en-US", "value": "A" },
            { "key": "b", "language": "en-US", "value": "B" }
        ])
    );
    assert!(!cwd.path().join("out/folders.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn apply_with_empty_schema_diff_skips_apply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/schema/diff"))
        .and(body_json(json!({ "version": 1 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/schema/apply"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let cwd = tempdir().unwrap();
    std::fs::create_dir(cwd.path().join("snapshot")).unwrap();
    std::fs::write(cwd.path().join("snapshot/schema.json"), "{ \"version\": 1 }").unwrap();

    cms_sync(cwd.path())
        .args(["apply", "--host", &server.uri(), "--token", "secret", "--only", "schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applying snapshots..."))
        .stdout(predicate::str::contains("  [schema] OK"))
        .stdout(predicate::str::contains("Done!"));
}
