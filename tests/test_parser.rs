use quay::http::parser::{
    CheckState, LineStatus, ParseOutcome, READ_BUFFER_SIZE, RequestParser,
};
use quay::http::request::Method;

fn parse_all(bytes: &[u8]) -> (RequestParser, ParseOutcome) {
    let mut parser = RequestParser::new();
    assert_eq!(parser.feed(bytes), bytes.len());
    let outcome = parser.process_read();
    (parser, outcome)
}

/// Feeds `bytes` in `chunk`-sized pieces, running the parser after each.
fn parse_chunked(bytes: &[u8], chunk: usize) -> (RequestParser, ParseOutcome) {
    let mut parser = RequestParser::new();
    let mut outcome = ParseOutcome::NeedMoreData;
    for piece in bytes.chunks(chunk) {
        assert_eq!(parser.feed(piece), piece.len());
        outcome = parser.process_read();
        if outcome != ParseOutcome::NeedMoreData {
            break;
        }
    }
    (parser, outcome)
}

#[test]
fn test_parse_simple_get_request() {
    let (parser, outcome) = parse_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
    assert_eq!(outcome, ParseOutcome::CompleteRequest);

    let req = parser.request().unwrap();
    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/");
    assert_eq!(req.version, "HTTP/1.1");
    assert_eq!(req.host.as_deref(), Some("example.com"));
    assert!(!req.linger);
    assert!(req.body.is_empty());
}

#[test]
fn test_request_line_only_advances_to_headers() {
    let (parser, outcome) = parse_all(b"GET /a/b HTTP/1.1\r\n");
    assert_eq!(outcome, ParseOutcome::NeedMoreData);
    assert_eq!(parser.state(), CheckState::Headers);
    assert_eq!(parser.method(), Some(Method::GET));
    assert_eq!(parser.url(), Some("/a/b"));
    assert_eq!(parser.version(), Some("HTTP/1.1"));
}

#[test]
fn test_result_independent_of_read_boundaries() {
    let raw: &[u8] =
        b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\r\n";
    let (whole, outcome) = parse_all(raw);
    assert_eq!(outcome, ParseOutcome::CompleteRequest);
    let expected = whole.request().unwrap();

    for chunk in 1..raw.len() {
        let (parser, outcome) = parse_chunked(raw, chunk);
        assert_eq!(outcome, ParseOutcome::CompleteRequest, "chunk size {}", chunk);
        assert_eq!(parser.request().unwrap(), expected, "chunk size {}", chunk);
    }
}

#[test]
fn test_cr_split_from_lf_across_reads() {
    let mut parser = RequestParser::new();
    parser.feed(b"GET / HTTP/1.1\r");
    assert_eq!(parser.process_read(), ParseOutcome::NeedMoreData);
    assert_eq!(parser.state(), CheckState::RequestLine);

    parser.feed(b"\n\r\n");
    assert_eq!(parser.process_read(), ParseOutcome::CompleteRequest);
}

#[test]
fn test_keep_alive_sets_linger() {
    let (parser, outcome) =
        parse_all(b"GET / HTTP/1.1\r\nConnection: Keep-Alive\r\n\r\n");
    assert_eq!(outcome, ParseOutcome::CompleteRequest);
    assert!(parser.linger());
    assert!(parser.request().unwrap().keep_alive());

    let (parser, _) = parse_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(!parser.linger());
}

#[test]
fn test_non_get_method_is_malformed() {
    let (_, outcome) = parse_all(b"POST /api HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
    assert!(matches!(outcome, ParseOutcome::MalformedRequest(_)));
}

#[test]
fn test_lowercase_get_is_accepted() {
    let (parser, outcome) = parse_all(b"get / HTTP/1.1\r\n\r\n");
    assert_eq!(outcome, ParseOutcome::CompleteRequest);
    assert_eq!(parser.method(), Some(Method::GET));
}

#[test]
fn test_http_1_0_is_malformed() {
    let (_, outcome) = parse_all(b"GET / HTTP/1.0\r\n\r\n");
    assert!(matches!(outcome, ParseOutcome::MalformedRequest(_)));
}

#[test]
fn test_relative_target_is_malformed() {
    let (_, outcome) = parse_all(b"GET index.html HTTP/1.1\r\n\r\n");
    assert!(matches!(outcome, ParseOutcome::MalformedRequest(_)));
}

#[test]
fn test_absolute_uri_is_reduced_to_path() {
    let (parser, outcome) = parse_all(b"GET http://example.com:8080/docs/a.html HTTP/1.1\r\n\r\n");
    assert_eq!(outcome, ParseOutcome::CompleteRequest);

    let req = parser.request().unwrap();
    assert_eq!(req.path, "/docs/a.html");
    assert_eq!(req.host.as_deref(), Some("example.com:8080"));
}

#[test]
fn test_host_header_overrides_uri_authority() {
    let (parser, _) =
        parse_all(b"GET http://a.example/x HTTP/1.1\r\nHost: b.example\r\n\r\n");
    assert_eq!(parser.host(), Some("b.example"));
}

#[test]
fn test_bare_lf_is_malformed() {
    let (_, outcome) = parse_all(b"GET / HTTP/1.1\nHost: x\n\n");
    assert!(matches!(outcome, ParseOutcome::MalformedRequest(_)));
}

#[test]
fn test_cr_not_followed_by_lf_is_malformed() {
    let (_, outcome) = parse_all(b"GET / HTTP/1.1\rX\r\n\r\n");
    assert!(matches!(outcome, ParseOutcome::MalformedRequest(_)));
}

#[test]
fn test_header_without_colon_is_malformed() {
    let (_, outcome) = parse_all(b"GET / HTTP/1.1\r\nGarbage\r\n\r\n");
    assert!(matches!(outcome, ParseOutcome::MalformedRequest(_)));
}

#[test]
fn test_unknown_headers_are_ignored() {
    let (parser, outcome) = parse_all(
        b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n",
    );
    assert_eq!(outcome, ParseOutcome::CompleteRequest);
    assert_eq!(parser.request().unwrap().path, "/path");
}

#[test]
fn test_body_waits_for_content_length() {
    let mut parser = RequestParser::new();
    parser.feed(b"GET /upload HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello");
    assert_eq!(parser.process_read(), ParseOutcome::NeedMoreData);
    assert_eq!(parser.state(), CheckState::Body);

    parser.feed(b"world");
    assert_eq!(parser.process_read(), ParseOutcome::CompleteRequest);

    let req = parser.request().unwrap();
    assert_eq!(req.content_length, Some(10));
    assert_eq!(req.body, b"helloworld".to_vec());
    assert!(req.has_body());
}

#[test]
fn test_zero_content_length_completes() {
    let (parser, outcome) = parse_all(b"GET / HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(outcome, ParseOutcome::CompleteRequest);
    assert!(parser.request().unwrap().body.is_empty());
}

#[test]
fn test_oversized_content_length_is_malformed() {
    let raw = format!("GET / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", READ_BUFFER_SIZE);
    let (_, outcome) = parse_all(raw.as_bytes());
    assert!(matches!(outcome, ParseOutcome::MalformedRequest(_)));
}

#[test]
fn test_full_buffer_without_complete_request_is_malformed() {
    let mut parser = RequestParser::new();
    let mut raw = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
    raw.resize(READ_BUFFER_SIZE + 100, b'a');

    assert_eq!(parser.feed(&raw), READ_BUFFER_SIZE);
    assert!(parser.is_full());
    assert!(matches!(parser.process_read(), ParseOutcome::MalformedRequest(_)));
}

#[test]
fn test_parse_line_zeroes_terminators() {
    let mut parser = RequestParser::new();
    parser.feed(b"AB\r\nCD");
    assert_eq!(parser.parse_line(), LineStatus::Ok);
    assert_eq!(parser.checked_index(), 4);
    assert_eq!(parser.take_line(), b"AB");
    assert_eq!(parser.start_line(), 4);

    assert_eq!(parser.parse_line(), LineStatus::Open);
    assert_eq!(parser.checked_index(), 6);
}

#[test]
fn test_reset_allows_next_request() {
    let (mut parser, outcome) = parse_all(b"GET /one HTTP/1.1\r\n\r\n");
    assert_eq!(outcome, ParseOutcome::CompleteRequest);

    parser.reset();
    assert_eq!(parser.read_index(), 0);
    assert_eq!(parser.state(), CheckState::RequestLine);
    assert!(parser.request().is_none());

    parser.feed(b"GET /two HTTP/1.1\r\n\r\n");
    assert_eq!(parser.process_read(), ParseOutcome::CompleteRequest);
    assert_eq!(parser.request().unwrap().path, "/two");
}

#[test]
fn test_incomplete_request_missing_blank_line() {
    let (parser, outcome) = parse_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n");
    assert_eq!(outcome, ParseOutcome::NeedMoreData);
    assert!(parser.request().is_none());
}
