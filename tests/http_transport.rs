#![cfg(feature = "http-ureq")]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use pose_anchor::transport::{decode_response, MultipartForm};
use pose_anchor::{HttpTransport, PipelineError, PoseEstimate, UreqTransport};

struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn read_request(stream: &mut TcpStream) -> Captured {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse::<usize>().unwrap())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).unwrap();
    Captured {
        request_line: request_line.trim_end().to_string(),
        headers,
        body,
    }
}

/// One-shot server answering with `status` and `body`.
fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let captured = read_request(&mut stream);
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();
        let _ = tx.send(captured);
    });
    (format!("http://{}", addr), rx)
}

fn transport() -> UreqTransport {
    UreqTransport::new(Duration::from_secs(5))
}

#[test]
fn get_returns_body() {
    let (base, requests) = serve_once(
        "200 OK",
        r#"{"colmap": {"ip": "127.0.0.1", "port": 40020}}"#,
    );
    let response = transport().get(&format!("{}/lookup", base)).unwrap();

    assert_eq!(response.status, 200);
    assert!(response.body.contains("40020"));
    let captured = requests.recv().unwrap();
    assert_eq!(captured.request_line, "GET /lookup HTTP/1.1");
}

#[test]
fn multipart_upload_reaches_server_intact() {
    let (base, requests) = serve_once(
        "200 OK",
        r#"{"name": "tor", "position": [0.5, 0, 1], "rotation": [1, 0, 0, 0]}"#,
    );
    let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 7, 7, 7, 0xFF, 0xD9];
    let form = MultipartForm::with_boundary("Zq4".repeat(13) + "x")
        .text("message", "rotationZ90,")
        .file("file", "upload.jpg", "image/jpeg", jpeg.clone());
    let content_type = form.content_type();
    let boundary = form.boundary().to_string();

    let response = transport()
        .post(&format!("{}/localize", base), &content_type, form.into_body())
        .unwrap();
    let estimate: PoseEstimate = decode_response(&response).unwrap();
    assert_eq!(estimate.position, [0.5, 0.0, 1.0]);

    let captured = requests.recv().unwrap();
    assert_eq!(captured.request_line, "POST /localize HTTP/1.1");
    assert_eq!(captured.header("content-type"), Some(content_type.as_str()));
    assert!(captured.body.ends_with(format!("\r\n--{}--\r\n", boundary).as_bytes()));

    // The service slices the JPEG at fixed offsets around the filename and the trailer.
    let start = captured
        .body
        .windows(3)
        .position(|w| w == b"jpg")
        .unwrap()
        + 8;
    let end = captured.body.len() - 48;
    assert_eq!(&captured.body[start..end], jpeg.as_slice());
}

#[test]
fn error_status_is_returned_as_response() {
    let (base, _requests) = serve_once(
        "500 Internal Server Error",
        r#"{"error": "model not loaded"}"#,
    );
    let response = transport().get(&base).unwrap();

    assert_eq!(response.status, 500);
    let decoded: Result<PoseEstimate, _> = decode_response(&response);
    assert_eq!(decoded, Err(PipelineError::ServiceError("model not loaded".into())));
}

#[test]
fn empty_error_response_is_transfer_failure() {
    let (base, _requests) = serve_once("503 Service Unavailable", "");
    let response = transport().get(&base).unwrap();

    let decoded: Result<PoseEstimate, _> = decode_response(&response);
    assert!(matches!(decoded, Err(PipelineError::TransferFailed(msg)) if msg.contains("503")));
}

#[test]
fn refused_connection_is_transfer_failure() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let result = transport().get(&format!("http://{}/", addr));
    assert!(matches!(result, Err(PipelineError::TransferFailed(_))));
}
