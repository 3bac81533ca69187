//! Caption translation via the public translation endpoint.
//!
//! One short-lived worker per incoming transcript issues a single GET with
//! `q` and `langpair=en|<code>` query parameters and reports back over a
//! channel. Every failure mode (transport error, non-2xx status, error
//! payload, malformed body) falls back to the untranslated original so the
//! user always sees some caption. Outcomes carry the call epoch that was
//! current when the request started; the caption pipeline drops results from
//! a call that has since ended.

use crate::lang::TargetLang;
use crate::{log_debug, log_debug_content};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// JSON body returned by the translation endpoint.
#[derive(Debug, Deserialize)]
struct TranslationResponse {
    #[serde(rename = "responseStatus", default)]
    response_status: Option<serde_json::Value>,
    #[serde(rename = "responseData", default)]
    response_data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(rename = "translatedText", default)]
    translated_text: Option<String>,
}

/// Result of one translation request, fallback already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOutcome {
    /// Call epoch the request belongs to.
    pub epoch: u64,
    /// Text to display (translated, or the original on failure).
    pub caption: String,
    pub translated: bool,
}

/// Handle for one in-flight translation request.
pub struct TranslationJob {
    pub receiver: mpsc::Receiver<TranslationOutcome>,
    pub handle: Option<thread::JoinHandle<()>>,
    pub epoch: u64,
}

/// Blocking HTTP client for the translation service.
pub struct Translator {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl Translator {
    /// The timeout closes the hung-request gap: a stalled service can only
    /// hold a caption back for this long.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build translation http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Fetch the caption for `text`: the translation when the service
    /// cooperates, `text` itself otherwise.
    fn fetch_caption(&self, text: &str, target: TargetLang) -> (String, bool) {
        let langpair = format!("en|{}", target.service_code());
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", text), ("langpair", langpair.as_str())])
            .send();
        match response {
            Ok(response) => {
                let status_ok = response.status().is_success();
                let status = response.status();
                match response.text() {
                    Ok(body) => {
                        if !status_ok {
                            log_debug(&format!("translation service returned HTTP {status}"));
                        }
                        caption_from_body(status_ok, &body, text)
                    }
                    Err(err) => {
                        log_debug(&format!("failed to read translation body: {err}"));
                        (text.to_string(), false)
                    }
                }
            }
            Err(err) => {
                log_debug(&format!("translation request failed: {err}"));
                (text.to_string(), false)
            }
        }
    }
}

/// Decide what to display from a service reply. Mirrors the service contract:
/// success means HTTP 2xx, a `responseStatus` of 200, and a non-empty
/// translated text; anything else keeps the original.
fn caption_from_body(status_ok: bool, body: &str, original: &str) -> (String, bool) {
    if !status_ok {
        return (original.to_string(), false);
    }
    let parsed: TranslationResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            log_debug(&format!("malformed translation response: {err}"));
            return (original.to_string(), false);
        }
    };
    let status_is_200 = parsed
        .response_status
        .as_ref()
        .and_then(|value| value.as_i64())
        .map(|status| status == 200)
        .unwrap_or(false);
    if !status_is_200 {
        log_debug("translation service reported a non-200 payload status");
        return (original.to_string(), false);
    }
    match parsed
        .response_data
        .and_then(|data| data.translated_text)
        .map(|text| text.trim().to_string())
    {
        Some(text) if !text.is_empty() => (text, true),
        _ => (original.to_string(), false),
    }
}

/// Spawn a worker thread for one translation request.
pub fn start_translation_job(
    translator: Arc<Translator>,
    text: String,
    target: TargetLang,
    epoch: u64,
) -> TranslationJob {
    let (tx, rx) = mpsc::sync_channel(1);

    let handle = thread::spawn(move || {
        let (caption, translated) = translator.fetch_caption(&text, target);
        if translated {
            log_debug_content(&format!(
                "translated \"{text}\" -> \"{caption}\" ({})",
                target.service_code()
            ));
        }
        let _ = tx.send(TranslationOutcome {
            epoch,
            caption,
            translated,
        });
    });

    TranslationJob {
        receiver: rx,
        handle: Some(handle),
        epoch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "hello";

    #[test]
    fn successful_body_yields_translated_text() {
        let body = r#"{"responseStatus":200,"responseData":{"translatedText":"hola"}}"#;
        assert_eq!(
            caption_from_body(true, body, ORIGINAL),
            ("hola".to_string(), true)
        );
    }

    #[test]
    fn http_failure_falls_back_to_original() {
        let body = r#"{"responseStatus":200,"responseData":{"translatedText":"hola"}}"#;
        assert_eq!(
            caption_from_body(false, body, ORIGINAL),
            (ORIGINAL.to_string(), false)
        );
    }

    #[test]
    fn error_payload_status_falls_back_to_original() {
        let body = r#"{"responseStatus":403,"responseData":{"translatedText":"MYMEMORY WARNING"}}"#;
        assert_eq!(
            caption_from_body(true, body, ORIGINAL),
            (ORIGINAL.to_string(), false)
        );
    }

    #[test]
    fn string_payload_status_is_not_success() {
        // Some error replies carry the status as a string; strict matching
        // keeps those on the fallback path.
        let body = r#"{"responseStatus":"200","responseData":{"translatedText":"hola"}}"#;
        assert_eq!(
            caption_from_body(true, body, ORIGINAL),
            (ORIGINAL.to_string(), false)
        );
    }

    #[test]
    fn malformed_body_falls_back_to_original() {
        for body in ["not json", "", "{\"responseStatus\":200}"] {
            assert_eq!(
                caption_from_body(true, body, ORIGINAL),
                (ORIGINAL.to_string(), false),
                "body {body:?} should fall back"
            );
        }
    }

    #[test]
    fn empty_translation_falls_back_to_original() {
        let body = r#"{"responseStatus":200,"responseData":{"translatedText":"   "}}"#;
        assert_eq!(
            caption_from_body(true, body, ORIGINAL),
            (ORIGINAL.to_string(), false)
        );
    }

    /// One-shot HTTP stub: accepts a single request, returns the canned JSON
    /// body, and hands the request head back for assertions.
    fn spawn_translation_stub(body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind http stub");
        let addr = listener.local_addr().expect("stub addr");
        let endpoint = format!("http://{addr}/get");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept request");
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                if stream.read(&mut byte).expect("read request") == 0 {
                    break;
                }
                head.push(byte[0]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).expect("write response");
            String::from_utf8_lossy(&head).to_string()
        });
        (endpoint, handle)
    }

    #[test]
    fn job_translates_through_a_live_endpoint() {
        let (endpoint, stub) = spawn_translation_stub(
            r#"{"responseStatus":200,"responseData":{"translatedText":"hola mundo"}}"#,
        );
        let translator = Arc::new(
            Translator::new(&endpoint, Duration::from_secs(5)).expect("client should build"),
        );
        let mut job = start_translation_job(
            translator,
            "hello world".to_string(),
            TargetLang::Spanish,
            3,
        );
        let outcome = job
            .receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("job should report");
        if let Some(handle) = job.handle.take() {
            let _ = handle.join();
        }
        assert_eq!(outcome.epoch, 3);
        assert_eq!(outcome.caption, "hola mundo");
        assert!(outcome.translated);

        let request_head = stub.join().expect("stub thread");
        assert!(request_head.starts_with("GET /get?"));
        // The pipe in the langpair is percent-encoded on the wire.
        assert!(
            request_head.contains("langpair=en%7Ces"),
            "unexpected request: {request_head}"
        );
    }

    #[test]
    fn job_reports_fallback_outcome_for_unreachable_service() {
        // Port 9 on localhost is the discard service; nothing listens there
        // in practice and the connection is refused immediately.
        let translator = Arc::new(
            Translator::new("http://127.0.0.1:9/get", Duration::from_millis(500))
                .expect("client should build"),
        );
        let mut job = start_translation_job(
            translator,
            "hello".to_string(),
            TargetLang::French,
            7,
        );
        let outcome = job
            .receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("job should report");
        if let Some(handle) = job.handle.take() {
            let _ = handle.join();
        }
        assert_eq!(outcome.epoch, 7);
        assert_eq!(outcome.caption, "hello");
        assert!(!outcome.translated);
    }
}
