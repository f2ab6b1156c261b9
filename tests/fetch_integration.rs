// Integration tests driving HttpClient against a loopback server.

mod helpers;

use std::net::TcpListener;

use brief_fetcher::{FailureKind, FetchError, ParseError, SocketError, UrlError};
use brief_fetcher::parse::extract;
use helpers::{fetch, fetch_with, Reply, TestServer};

#[test]
fn test_fetch_returns_body() {
    let server = TestServer::start(|_, _| Reply::ok("hello world"));
    assert_eq!(fetch(&server.url("/")), Ok("hello world".to_string()));
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_body_is_identical_when_delivered_byte_by_byte() {
    let body = "<html><body>The same page, one byte at a time</body></html>";
    let whole = TestServer::start(move |_, _| Reply::ok(body));
    let trickle = TestServer::start(move |_, _| Reply::ok(body).in_pieces(1));

    let expected = fetch(&whole.url("/")).expect("single write should succeed");
    assert_eq!(expected, body);
    assert_eq!(fetch(&trickle.url("/")), Ok(expected));
}

#[test]
fn test_request_format() {
    let server = TestServer::start(|_, _| Reply::ok("ok"));
    fetch(&server.url("/path?q=1#fragment")).expect("fetch should succeed");

    let requests = server.requests();
    let head = &requests[0];
    assert!(head.starts_with("GET /path?q=1 HTTP/1.1\r\n"), "{head}");
    assert!(head.contains(&format!("Host: 127.0.0.1:{}\r\n", server.port)));
    assert!(head.contains("Connection: close\r\n"));
    assert!(head.contains("Accept: text/*\r\n"));
    assert!(head.contains("User-Agent: Mozilla/5.0"));
    assert!(head.ends_with("\r\n\r\n"));
}

#[test]
fn test_relative_redirect_is_followed() {
    let server = TestServer::start(|index, _| match index {
        0 => Reply::redirect("/final"),
        _ => Reply::ok("final page"),
    });

    // The 3xx body must never be surfaced.
    assert_eq!(fetch(&server.url("/start")), Ok("final page".to_string()));
    assert_eq!(server.targets(), vec!["/start", "/final"]);
}

#[test]
fn test_client_url_tracks_the_redirect() {
    let page = r#"<html><body><div>
        <div><h2>The Brief</h2></div>
        <a href="story">Relative story</a>
      </div></body></html>"#;
    let server = TestServer::start(move |index, _| match index {
        0 => Reply::redirect("/section/latest"),
        _ => Reply::ok(page),
    });

    let fetched = fetch_with(&server.url("/start"), |_| {});
    assert_eq!(fetched.url.to_string(), server.url("/section/latest"));
    assert_eq!(fetched.redirects_left, 4);

    // Relative links resolve against the page that was actually served.
    let body = fetched.result.expect("fetch should succeed");
    let links = extract(&body, &fetched.url.to_string()).expect("brief should be found");
    assert_eq!(
        links.keys().collect::<Vec<_>>(),
        vec![&server.url("/section/story")]
    );
}

#[test]
fn test_absolute_redirect_is_followed() {
    let target = TestServer::start(|_, _| Reply::ok("moved here"));
    let location = target.url("/new");
    let origin = TestServer::start(move |_, _| Reply::redirect(&location));

    assert_eq!(fetch(&origin.url("/old")), Ok("moved here".to_string()));
    assert_eq!(origin.targets(), vec!["/old"]);
    assert_eq!(target.targets(), vec!["/new"]);
}

#[test]
fn test_redirect_budget_allows_five_requests() {
    let server = TestServer::start(|index, _| Reply::redirect(&format!("/hop{}", index + 1)));

    let result = fetch(&server.url("/hop0"));
    assert_eq!(result, Err(FetchError::TooManyRedirects));
    assert_eq!(result.unwrap_err().kind(), FailureKind::Policy);
    assert_eq!(
        server.targets(),
        vec!["/hop0", "/hop1", "/hop2", "/hop3", "/hop4"]
    );
}

#[test]
fn test_four_redirects_are_followed() {
    let server = TestServer::start(|index, _| match index {
        0..=3 => Reply::redirect(&format!("/hop{}", index + 1)),
        _ => Reply::ok("made it"),
    });

    assert_eq!(fetch(&server.url("/hop0")), Ok("made it".to_string()));
    assert_eq!(server.requests().len(), 5);
}

#[test]
fn test_redirect_to_unsupported_scheme_fails() {
    let server = TestServer::start(|_, _| Reply::redirect("ftp://files.example/x"));
    let result = fetch(&server.url("/"));
    assert!(
        matches!(result, Err(FetchError::Redirect(UrlError::Invalid(_)))),
        "{result:?}"
    );
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_header_without_colon_fails() {
    let server = TestServer::start(|_, _| {
        Reply::raw("HTTP/1.1 200 OK\r\nthis header has no colon\r\nContent-Length: 2\r\n\r\nok")
    });
    let result = fetch(&server.url("/"));
    assert!(
        matches!(
            result,
            Err(FetchError::Parse(ParseError::HeaderWithoutColon(_)))
        ),
        "{result:?}"
    );
    assert_eq!(result.unwrap_err().kind(), FailureKind::ProtocolParse);
}

#[test]
fn test_status_out_of_range_fails() {
    let server = TestServer::start(|_, _| Reply::raw("HTTP/1.1 999 Weird\r\n\r\n"));
    let result = fetch(&server.url("/"));
    assert!(
        matches!(
            result,
            Err(FetchError::Parse(ParseError::StatusOutOfRange(_)))
        ),
        "{result:?}"
    );
}

#[test]
fn test_peer_closing_before_content_length_fails() {
    let server = TestServer::start(|_, _| {
        Reply::raw("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nhello")
    });
    let result = fetch(&server.url("/"));
    assert_eq!(
        result,
        Err(FetchError::PeerClosedEarly {
            received: 5,
            expected: 100
        })
    );
    assert_eq!(result.unwrap_err().kind(), FailureKind::PeerClosedEarly);
}

#[test]
fn test_peer_closing_before_head_fails() {
    let server = TestServer::start(|_, _| Reply::raw("HTTP/1.1 200 OK\r\nContent-"));
    assert_eq!(
        fetch(&server.url("/")),
        Err(FetchError::Socket(SocketError::PeerClosed))
    );
}

#[test]
fn test_close_delimited_body() {
    let server = TestServer::start(|_, _| {
        Reply::raw("HTTP/1.0 200 OK\r\nContent-Type: text/html\r\n\r\nuntil the end").in_pieces(4)
    });
    assert_eq!(fetch(&server.url("/")), Ok("until the end".to_string()));
}

#[test]
fn test_empty_bodies() {
    let no_content = TestServer::start(|_, _| Reply::raw("HTTP/1.1 204 No Content\r\n\r\n"));
    assert_eq!(fetch(&no_content.url("/")), Ok(String::new()));

    let zero_length =
        TestServer::start(|_, _| Reply::raw("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"));
    assert_eq!(fetch(&zero_length.url("/")), Ok(String::new()));
}

#[test]
fn test_chunked_body_is_rejected() {
    let server = TestServer::start(|_, _| {
        Reply::raw("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n")
    });
    assert_eq!(
        fetch(&server.url("/")),
        Err(FetchError::UnsupportedTransferEncoding("chunked".to_string()))
    );
}

#[test]
fn test_large_body_arrives_intact() {
    let body: String = (0..100_000)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();
    let served = body.clone();
    let server = TestServer::start(move |_, _| Reply::ok(&served));

    let received = fetch(&server.url("/big")).expect("large body should arrive");
    assert_eq!(received.len(), body.len());
    assert_eq!(received, body);
}

#[test]
fn test_connection_refused_is_a_transport_failure() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        listener.local_addr().expect("No local address").port()
    };

    let result = fetch(&format!("http://127.0.0.1:{port}/"));
    assert!(
        matches!(result, Err(FetchError::Socket(SocketError::Connect { .. }))),
        "{result:?}"
    );
    assert_eq!(result.unwrap_err().kind(), FailureKind::Transport);
}
