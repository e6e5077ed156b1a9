//! End-to-end fetch behavior against a local stub HTTP server.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dmv_scraper_lib::{DmvClient, RetryPolicy};

fn respond(stream: TcpStream, status_line: &str, body: &str) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut line = String::new();
    // Drain the request head; a GET carries no body.
    loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    let mut stream = stream;
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

/// Serves the given canned responses, one per connection, then exits.
fn stub_server(responses: Vec<(&'static str, &'static str)>) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));

    let handle = thread::spawn(move || {
        for (status, body) in responses {
            let (stream, _) = listener.accept().expect("accept connection");
            respond(stream, status, body);
        }
    });

    (base_url, handle)
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(10),
        Duration::from_millis(50),
    )
}

#[test]
fn fetch_succeeds_on_third_attempt() {
    let (base_url, server) = stub_server(vec![
        ("500 Internal Server Error", "{}"),
        ("503 Service Unavailable", "{}"),
        ("200 OK", r#"{"daily_averages": {"monday": [5, 10, 15]}}"#),
    ]);

    let client = DmvClient::new(&base_url, fast_policy(5));
    let result = client.fetch_wait_history("arleta");
    server.join().expect("server thread");

    assert!(result.success);
    assert_eq!(result.attempts_needed, 3);
    assert_eq!(result.slug, "arleta");
    assert!(result.error.is_none());
    let data = result.data.expect("payload");
    assert!(data.get("daily_averages").is_some());
    assert!(result.api_url.ends_with("/api/wait_times_daily_averages?slug=arleta"));
}

#[test]
fn exhausted_retries_record_failure_instead_of_erroring() {
    let (base_url, server) = stub_server(vec![
        ("500 Internal Server Error", "{}"),
        ("500 Internal Server Error", "{}"),
        ("500 Internal Server Error", "{}"),
    ]);

    let client = DmvClient::new(&base_url, fast_policy(3));
    let result = client.fetch_wait_history("fresno");
    server.join().expect("server thread");

    assert!(!result.success);
    assert_eq!(result.attempts_needed, 3);
    assert!(result.data.is_none());
    assert!(result.error.expect("last error recorded").contains("500"));
}

#[test]
fn malformed_body_counts_as_a_failed_attempt() {
    let (base_url, server) = stub_server(vec![
        ("200 OK", "<html>definitely not json</html>"),
        ("200 OK", r#"{"daily_averages": {}}"#),
    ]);

    let client = DmvClient::new(&base_url, fast_policy(5));
    let result = client.fetch_wait_history("bakersfield");
    server.join().expect("server thread");

    assert!(result.success);
    assert_eq!(result.attempts_needed, 2);
}

#[test]
fn first_attempt_success_needs_one_attempt() {
    let (base_url, server) = stub_server(vec![("200 OK", r#"{"daily_averages": {}}"#)]);

    let client = DmvClient::new(&base_url, fast_policy(5));
    let result = client.fetch_wait_history("arleta");
    server.join().expect("server thread");

    assert!(result.success);
    assert_eq!(result.attempts_needed, 1);
}

#[test]
fn unreachable_endpoint_fails_cleanly() {
    // Port 9 (discard) is unroutable for HTTP; every attempt errors fast.
    let client = DmvClient::new("http://127.0.0.1:9", fast_policy(2));
    let result = client.fetch_wait_history("arleta");

    assert!(!result.success);
    assert_eq!(result.attempts_needed, 2);
    assert!(result.data.is_none());
    assert!(result.error.is_some());
}
