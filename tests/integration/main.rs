//! Integration tests for Lode

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn lode() -> Command {
        cargo_bin_cmd!("lode")
    }

    #[test]
    fn help_displays() {
        lode()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("native inference engine"));
    }

    #[test]
    fn version_displays() {
        lode()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("lode"));
    }

    #[test]
    fn checksum_matches_known_digest() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("data.bin");
        std::fs::write(&file, b"abc").unwrap();

        lode()
            .arg("checksum")
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            ));
    }

    #[test]
    fn checksum_missing_file_fails() {
        lode()
            .args(["checksum", "/nonexistent/file.bin"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn status_shows_cache_root() {
        let temp = TempDir::new().unwrap();
        lode()
            .arg("--cache-dir")
            .arg(temp.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache root"))
            .stdout(predicate::str::contains("No cached builds"));
    }

    #[test]
    fn status_json_is_parseable() {
        let temp = TempDir::new().unwrap();
        let output = lode()
            .arg("--cache-dir")
            .arg(temp.path())
            .args(["status", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let status: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert!(status["builds"].as_array().unwrap().is_empty());
        assert_eq!(status["loaded"], serde_json::Value::Bool(false));
    }

    #[test]
    fn clean_empty_cache_reports_zero() {
        let temp = TempDir::new().unwrap();
        lode()
            .arg("--cache-dir")
            .arg(temp.path())
            .args(["clean", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 0"));
    }

    #[test]
    fn clean_without_yes_fails_non_interactive() {
        let temp = TempDir::new().unwrap();
        lode()
            .arg("--cache-dir")
            .arg(temp.path())
            .arg("clean")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--yes"));
    }

    #[test]
    fn download_rejects_bad_platform_spec() {
        let temp = TempDir::new().unwrap();
        lode()
            .arg("--cache-dir")
            .arg(temp.path())
            .args(["download", "amiga-m68k"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid platform spec"));
    }

    #[test]
    fn download_unreachable_index_reports_per_platform() {
        let temp = TempDir::new().unwrap();
        lode()
            .arg("--cache-dir")
            .arg(temp.path())
            .args([
                "--index-url",
                "http://127.0.0.1:9",
                "download",
                "linux-x64",
            ])
            .assert()
            .failure()
            .stdout(predicate::str::contains("failed"));
    }

    #[test]
    fn invalid_config_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "repo = broken").unwrap();

        lode()
            .arg("--config")
            .arg(&config)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid configuration"));
    }
}

mod pipeline_tests {
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine_zip(library_name: &str, payload: &[u8]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file(format!("build/bin/{}", library_name), options)
            .unwrap();
        writer.write_all(payload).unwrap();
        writer.finish().unwrap().into_inner()
    }

    /// Full CLI download against a local release index: resolve, match,
    /// fetch, extract, cache, digest.
    #[tokio::test]
    async fn download_provisions_from_mock_index() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/ggml-org/llama.cpp/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag_name": "b77",
                "assets": [{
                    "name": "llama-b77-bin-ubuntu-x64.zip",
                    "browser_download_url": format!("{}/dl/b77.zip", server.uri()),
                }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dl/b77.zip"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(engine_zip("libllama.so", b"fake engine")),
            )
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().to_path_buf();
        let index_url = server.uri();

        let assert = tokio::task::spawn_blocking(move || {
            cargo_bin_cmd!("lode")
                .arg("--cache-dir")
                .arg(&cache_dir)
                .arg("--index-url")
                .arg(&index_url)
                .args(["download", "linux-x64"])
                .assert()
        })
        .await
        .unwrap();

        assert
            .success()
            .stdout(predicate::str::contains("ok"))
            .stdout(predicate::str::contains("sha256:"));

        let library = temp
            .path()
            .join("b77")
            .join("linux-x64")
            .join("build")
            .join("bin")
            .join("libllama.so");
        assert_eq!(std::fs::read(&library).unwrap(), b"fake engine");
    }

    #[tokio::test]
    async fn download_unknown_tag_reports_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().to_path_buf();
        let index_url = server.uri();

        let assert = tokio::task::spawn_blocking(move || {
            cargo_bin_cmd!("lode")
                .arg("--cache-dir")
                .arg(&cache_dir)
                .arg("--index-url")
                .arg(&index_url)
                .args(["download", "--tag", "v1", "linux-x64"])
                .assert()
        })
        .await
        .unwrap();

        assert
            .failure()
            .stdout(predicate::str::contains("release not found: v1"));
    }
}
