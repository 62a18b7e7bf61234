//! HTTP fetcher behavior against a mock server: retry-until-success,
//! byte-range resume, retry exhaustion, and cancellation.

use rede_pipeline::config::SourceLocator;
use rede_pipeline::fetch::{Fetcher, FtpConfig, RetryPolicy};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_fetcher(max_attempts: u32) -> Fetcher {
    let ftp = FtpConfig {
        host: "localhost".to_string(),
        port: 21,
        username: "anonymous".to_string(),
        password: "anonymous@".to_string(),
    };
    Fetcher::new(
        ftp,
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn fetch_succeeds_on_third_attempt_and_records_all_attempts() {
    let server = MockServer::start().await;
    let body = b"archive-bytes".to_vec();

    Mock::given(method("GET"))
        .and(path("/extracts/assessor.zip"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/extracts/assessor.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let locator = SourceLocator::parse(&format!("{}/extracts/assessor.zip", server.uri()));

    let report = test_fetcher(3)
        .fetch(&locator, dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempts.len(), 3);
    assert!(report.attempts[0].error.is_some());
    assert!(report.attempts[1].error.is_some());
    assert!(report.attempts[2].error.is_none());
    assert_eq!(report.bytes_transferred, body.len() as u64);
    assert_eq!(std::fs::read(&report.local_path).unwrap(), body);
}

#[tokio::test]
async fn fetch_resumes_from_partial_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/extracts/assessor.zip"))
        .and(header("Range", "bytes=5-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 5-12/13")
                .set_body_bytes(b", World!".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("assessor.zip.part"), b"Hello").unwrap();

    let locator = SourceLocator::parse(&format!("{}/extracts/assessor.zip", server.uri()));
    let report = test_fetcher(1)
        .fetch(&locator, dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    // Only the continuation bytes travel on this attempt.
    assert_eq!(report.bytes_transferred, 8);
    assert_eq!(
        std::fs::read(&report.local_path).unwrap(),
        b"Hello, World!"
    );
    assert!(!dir.path().join("assessor.zip.part").exists());
}

#[tokio::test]
async fn fetch_fails_with_transfer_error_after_exhausting_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let locator = SourceLocator::parse(&format!("{}/extracts/assessor.zip", server.uri()));

    let err = test_fetcher(3)
        .fetch(&locator, dir.path(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "transfer");
    assert!(err.to_string().contains("3 attempts"));
}

#[tokio::test]
async fn fetch_observes_cancellation_before_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let dir = TempDir::new().unwrap();
    let locator = SourceLocator::parse(&format!("{}/extracts/assessor.zip", server.uri()));

    let err = test_fetcher(3)
        .fetch(&locator, dir.path(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "cancelled");
}
