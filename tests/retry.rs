//! Retry behaviour of the remote backend against real sockets.
//!
//! A refused port exercises the transport tier; a minimal in-process HTTP
//! responder exercises the rate-limit tier, the permanent no-retry short
//! circuit, and the model-listing check. Backoff sleeps are real, so
//! retries are kept to two attempts per test.

use ocr2doc::{OcrBackend, OcrConfig, OcrError, RemoteBackend};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Bind and immediately drop a listener to get a port nothing answers on.
fn refused_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/v1")
}

/// Serve a fixed HTTP response to every connection, counting hits.
///
/// Reads each request fully (headers plus the advertised body) before
/// answering, so the client never sees a reset mid-upload.
async fn fixed_responder(status: &'static str, body: &'static str, hits: Arc<AtomicUsize>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            hits.fetch_add(1, Ordering::SeqCst);

            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break None,
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break Some(pos + 4);
                        }
                    }
                }
            };
            let Some(header_end) = header_end else { continue };

            let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() - header_end < content_length {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{addr}/v1")
}

fn test_image(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("input.png");
    image::DynamicImage::new_rgb8(8, 8).save(&path).expect("png");
    path
}

#[tokio::test]
async fn transport_failures_are_retried_then_exhausted() {
    let config = OcrConfig::builder()
        .endpoint(refused_endpoint())
        .max_retries(2)
        .request_timeout_secs(5)
        .build()
        .expect("config");
    let backend = RemoteBackend::new(&config).expect("backend");

    let dir = tempfile::tempdir().expect("tempdir");
    let image_path = test_image(dir.path());
    let params = config.params(ocr2doc::OcrMode::PlainOcr);

    let started = Instant::now();
    let err = backend
        .infer("<image>\nOCR this image.", &image_path, dir.path(), &params)
        .await
        .expect_err("nothing is listening");

    match err {
        OcrError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected RetriesExhausted, got {other}"),
    }
    // One backoff between the two attempts: 2^0 = 1 second.
    assert!(started.elapsed().as_millis() >= 1000);
}

#[tokio::test]
async fn missing_image_fails_without_touching_the_network() {
    let config = OcrConfig::builder()
        .endpoint(refused_endpoint())
        .max_retries(2)
        .build()
        .expect("config");
    let backend = RemoteBackend::new(&config).expect("backend");

    let dir = tempfile::tempdir().expect("tempdir");
    let params = config.params(ocr2doc::OcrMode::PlainOcr);

    let started = Instant::now();
    let err = backend
        .infer(
            "<image>\nOCR this image.",
            &dir.path().join("missing.png"),
            dir.path(),
            &params,
        )
        .await
        .expect_err("file does not exist");

    assert!(matches!(err, OcrError::SourceUnreadable { .. }));
    // No retries, no backoff.
    assert!(started.elapsed().as_millis() < 500);
}

#[tokio::test]
async fn rate_limits_are_retried_with_linear_backoff() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = fixed_responder(
        "429 Too Many Requests",
        r#"{"error": "rate limited"}"#,
        Arc::clone(&hits),
    )
    .await;

    let config = OcrConfig::builder()
        .endpoint(endpoint)
        .max_retries(2)
        .request_timeout_secs(5)
        .build()
        .expect("config");
    let backend = RemoteBackend::new(&config).expect("backend");

    let dir = tempfile::tempdir().expect("tempdir");
    let image_path = test_image(dir.path());
    let params = config.params(ocr2doc::OcrMode::PlainOcr);

    let started = Instant::now();
    let err = backend
        .infer("<image>\nOCR this image.", &image_path, dir.path(), &params)
        .await
        .expect_err("server always answers 429");

    match err {
        OcrError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(last.contains("429"), "got: {last}");
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    // One rate-limit backoff between the two attempts: 5 × (0 + 1) seconds.
    assert!(started.elapsed().as_secs() >= 5);
}

#[tokio::test]
async fn permanent_rejection_is_never_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = fixed_responder(
        "404 Not Found",
        r#"{"error": "model not found"}"#,
        Arc::clone(&hits),
    )
    .await;

    let config = OcrConfig::builder()
        .endpoint(endpoint)
        .max_retries(3)
        .build()
        .expect("config");
    let backend = RemoteBackend::new(&config).expect("backend");

    let dir = tempfile::tempdir().expect("tempdir");
    let image_path = test_image(dir.path());
    let params = config.params(ocr2doc::OcrMode::PlainOcr);

    let started = Instant::now();
    let err = backend
        .infer("<image>\nOCR this image.", &image_path, dir.path(), &params)
        .await
        .expect_err("server always answers 404");

    match err {
        OcrError::InferenceRejected { detail } => {
            assert!(detail.contains("404"), "got: {detail}");
        }
        other => panic!("expected InferenceRejected, got {other}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // No backoff sleeps on the permanent path.
    assert!(started.elapsed().as_secs() < 4);
}

#[tokio::test]
async fn test_connection_reports_missing_model_as_not_ok() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = fixed_responder(
        "200 OK",
        r#"{"data": [{"id": "some-other-model"}]}"#,
        Arc::clone(&hits),
    )
    .await;

    let config = OcrConfig::builder()
        .endpoint(endpoint)
        .model("deepseek-ai/DeepSeek-OCR")
        .build()
        .expect("config");
    let backend = RemoteBackend::new(&config).expect("backend");

    let status = backend.test_connection().await.expect("connection check never errors");
    assert!(!status.ok);
    assert!(
        status.message.contains("deepseek-ai/DeepSeek-OCR"),
        "got: {}",
        status.message
    );
    assert!(status.message.contains("some-other-model"), "got: {}", status.message);
}

#[tokio::test]
async fn test_connection_reports_matching_model_as_ok() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = fixed_responder(
        "200 OK",
        r#"{"data": [{"id": "deepseek-ai/DeepSeek-OCR"}]}"#,
        Arc::clone(&hits),
    )
    .await;

    let config = OcrConfig::builder()
        .endpoint(endpoint)
        .model("deepseek-ai/DeepSeek-OCR")
        .build()
        .expect("config");
    let backend = RemoteBackend::new(&config).expect("backend");

    let status = backend.test_connection().await.expect("connection check never errors");
    assert!(status.ok, "got: {}", status.message);
}

#[tokio::test]
async fn test_connection_reports_unreachable_instead_of_failing() {
    let config = OcrConfig::builder()
        .endpoint(refused_endpoint())
        .request_timeout_secs(5)
        .build()
        .expect("config");
    let backend = RemoteBackend::new(&config).expect("backend");

    let status = backend.test_connection().await.expect("connection check never errors");
    assert!(!status.ok);
    assert!(status.message.contains("Connection to"));
}
