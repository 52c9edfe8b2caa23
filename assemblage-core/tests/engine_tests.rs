//! Integration tests for the assemblage engine

use assemblage_core::{
    AssemblerConfig, Assemblage, ContentSource, Engine, FetchError, Matcher, Pipeline, Replacer,
    Request, Resource, Response, StaticRepository, ERROR_STATUS, ERROR_TEXT,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

type Handler = Box<dyn Fn(&Request) -> Result<Response, FetchError> + Send + Sync>;

/// Pipeline answering from a fixed route table and recording every request
#[derive(Default)]
struct MapPipeline {
    routes: HashMap<String, Handler>,
    seen: Mutex<Vec<Request>>,
}

impl MapPipeline {
    fn route(self, uri: &str, handler: impl Fn(&Request) -> Response + Send + Sync + 'static) -> Self {
        self.outcome(uri, move |request| Ok(handler(request)))
    }

    fn outcome(
        mut self,
        uri: &str,
        handler: impl Fn(&Request) -> Result<Response, FetchError> + Send + Sync + 'static,
    ) -> Self {
        self.routes.insert(uri.to_string(), Box::new(handler));
        self
    }

    fn unreachable(self, uri: &str) -> Self {
        self.outcome(uri, |_| Err(FetchError::Transport("connection refused".into())))
    }

    fn html(self, uri: &str, body: &'static str) -> Self {
        self.route(uri, move |_| Response::ok("text/html", body))
    }

    fn requests(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pipeline for MapPipeline {
    async fn dispatch(&self, request: Request) -> Result<Response, FetchError> {
        self.seen.lock().unwrap().push(request.clone());
        match self.routes.get(&request.uri) {
            Some(handler) => handler(&request),
            None => Ok(Response::new(404).with_text("Not Found")),
        }
    }
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

fn box_matcher() -> Matcher {
    Matcher::named("box", re(r#"<box(?: class="([a-z]*)")? href="[^"]+">[^<]*</box>"#))
        .with_reference(re(r#"href="([^"]+)""#))
}

fn html_assemblage() -> Assemblage {
    Assemblage::new("html")
        .with_error(ERROR_STATUS, Replacer::new(re("ERR"), "code:*"))
        .with_error(ERROR_TEXT, Replacer::new(re("MSG"), "*"))
        .with_adjuster(Replacer::new(re("<h2>"), "<h2 class=\"{1}\">"))
}

fn repository() -> StaticRepository {
    StaticRepository::new().with(
        html_assemblage(),
        ["text/html"],
        vec![
            Resource::new("GET", re("^page$")).with_matcher(box_matcher()),
            Resource::new("GET", re("^article$"))
                .with_matcher(
                    Matcher::named("comments", re(r#"<comments href="[^"]*"/>"#))
                        .with_reference(re(r#"href="([^"]+)""#)),
                )
                .with_matcher(Matcher::named("meta", re("<meta/>"))),
            Resource::new("GET", re("^loop$")).with_matcher(
                Matcher::unnamed(re(r#"<box href="[^"]+">[^<]*</box>"#))
                    .with_reference(re(r#"href="([^"]+)""#)),
            ),
            Resource::new("GET", re(".")).with_matcher(box_matcher()),
        ],
    )
}

fn engine(pipeline: &Arc<MapPipeline>, settings: AssemblerConfig) -> Engine {
    Engine::new(Arc::new(repository()), pipeline.clone(), settings)
}

fn page_request(names: &str) -> Request {
    Request::get("/page")
        .with_scheme("https")
        .with_header("X-Filter", names)
        .with_header("Accept-Language", "en")
}

fn body(response: Response) -> String {
    match response.source {
        Some(ContentSource::Buffered(bytes)) => String::from_utf8(bytes.to_vec()).unwrap(),
        other => panic!("expected buffered content, got {other:?}"),
    }
}

#[tokio::test]
async fn test_block_replaced_by_reference_content() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .html("page", r#"A<box href="/x">old</box>B"#)
            .html("x", "NEW"),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.length, Some(5));
    assert_eq!(body(response), "ANEWB");
}

#[tokio::test]
async fn test_failed_reference_fills_error_slots() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .html("page", r#"A<box href="/x">ERR</box>B"#)
            .route("x", |_| Response::new(404).with_text("Not Found")),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(body(response), r#"A<box href="/x">code:404</box>B"#);
}

#[tokio::test]
async fn test_unknown_encoding_uses_sentinel_status() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .html("page", r#"<box href="/x">ERR MSG</box>"#)
            .route("x", |_| Response::ok("text/html", "x").with_charset("klingon")),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    assert_eq!(body(response), r#"<box href="/x">code:417 Unknown encoding</box>"#);
}

#[tokio::test]
async fn test_without_trigger_header_passes_through() {
    let pipeline = Arc::new(MapPipeline::default().html("page", r#"A<box href="/x">old</box>B"#));
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(Request::get("page"))
        .await;

    assert_eq!(body(response), r#"A<box href="/x">old</box>B"#);
    assert_eq!(pipeline.requests().len(), 1);
}

#[tokio::test]
async fn test_failed_outer_response_is_untouched() {
    let pipeline = Arc::new(MapPipeline::default());
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    assert_eq!(response.status, 404);
    assert_eq!(response.text.as_deref(), Some("Not Found"));
    assert_eq!(pipeline.requests().len(), 1);
}

#[tokio::test]
async fn test_oversized_outer_content_is_not_assembled() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .html("page", r#"A<box href="/x">old</box>B"#)
            .html("x", "NEW"),
    );
    let settings = AssemblerConfig {
        max_content_length: 10,
        ..AssemblerConfig::default()
    };
    let response = engine(&pipeline, settings).process(page_request("box")).await;

    assert_eq!(body(response), r#"A<box href="/x">old</box>B"#);
    assert_eq!(pipeline.requests().len(), 1);
}

#[tokio::test]
async fn test_nested_names_trim_and_adjust() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .html(
                "page",
                r#"<h1>Page</h1><box class="wide" href="/article?id=7">x</box>"#,
            )
            .html(
                "article",
                r#"<meta/><h2>Article</h2><comments href="/comments"/>"#,
            )
            .html("comments", "C1"),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box.comments"))
        .await;

    assert_eq!(
        body(response),
        r#"<h1>Page</h1><h2 class="wide">Article</h2>C1"#
    );

    let requests = pipeline.requests();
    let uris: Vec<_> = requests.iter().map(|r| r.uri.as_str()).collect();
    assert_eq!(uris, vec!["page", "article", "comments"]);

    let article = &requests[1];
    assert_eq!(article.method, "GET");
    assert_eq!(article.scheme, "https");
    assert_eq!(article.parameters, vec![("id".to_string(), "7".to_string())]);
    assert_eq!(article.headers.get("Accept-Language"), Some("en"));
    assert!(!article.headers.contains("X-Filter"));
}

#[tokio::test]
async fn test_unconfigured_reference_keeps_block() {
    let repository = StaticRepository::new().with(
        html_assemblage(),
        ["text/html"],
        vec![Resource::new("GET", re("^page$")).with_matcher(box_matcher())],
    );
    let pipeline = Arc::new(
        MapPipeline::default()
            .html("page", r#"A<box href="/x">old</box>B"#)
            .html("x", "NEW"),
    );
    let response = Engine::new(
        Arc::new(repository),
        pipeline.clone(),
        AssemblerConfig::default(),
    )
    .process(page_request("box"))
    .await;

    assert_eq!(body(response), r#"A<box href="/x">old</box>B"#);
    assert_eq!(pipeline.requests().len(), 1);
}

#[tokio::test]
async fn test_self_reference_stops_at_depth_limit() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .html("page", r#"<box href="/loop">start</box>"#)
            .html("loop", r#"<box href="/loop">L</box>"#),
    );
    let settings = AssemblerConfig {
        max_depth: 2,
        ..AssemblerConfig::default()
    };
    let response = engine(&pipeline, settings).process(page_request("box.x")).await;

    assert_eq!(body(response), r#"<box href="/loop">L</box>"#);
    assert_eq!(pipeline.requests().len(), 3);
}

#[tokio::test]
async fn test_charset_is_preserved() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .route("page", |_| {
                Response::ok("text/html", &b"caf\xe9 <box href=\"/x\">old</box>"[..])
                    .with_charset("ISO-8859-1")
            })
            .html("x", "cr\u{e8}me"),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    match response.source {
        Some(ContentSource::Buffered(bytes)) => {
            assert_eq!(bytes.as_ref(), b"caf\xe9 cr\xe8me");
        }
        other => panic!("expected buffered content, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_reference_fills_gateway_error() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .html("page", r#"A<box href="/x">ERR MSG</box>B"#)
            .unreachable("x"),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(body(response), r#"A<box href="/x">code:502 Bad Gateway</box>B"#);
}

#[tokio::test]
async fn test_wildcard_keeps_unrequested_sections_in_nested_content() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .html(
                "page",
                r#"<h1>Page</h1><box class="wide" href="/article">x</box>"#,
            )
            .html(
                "article",
                r#"<meta/><h2>Article</h2><comments href="/comments"/>"#,
            )
            .html("comments", "C1"),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box.comments, box.*"))
        .await;

    assert_eq!(
        body(response),
        r#"<h1>Page</h1><meta/><h2 class="wide">Article</h2>C1"#
    );
}

#[tokio::test]
async fn test_byte_order_mark_follows_declared_charset() {
    let pipeline = Arc::new(
        MapPipeline::default()
            .route("page", |_| {
                Response::ok("text/html", &b"\xef\xbb\xbf caf\xe9 <box href=\"/x\">old</box>"[..])
                    .with_charset("ISO-8859-1")
            })
            .html("x", "NEW"),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    match response.source {
        Some(ContentSource::Buffered(bytes)) => {
            assert_eq!(bytes.as_ref(), b"\xef\xbb\xbf caf\xe9 NEW");
        }
        other => panic!("expected buffered content, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unencodable_assembly_returns_original_content() {
    let original: &[u8] = b"{\"a\":\"<box href=\"/x\">old</box>\"}";
    let pipeline = Arc::new(
        MapPipeline::default()
            .route("page", move |_| {
                Response::ok("text/html", original).with_charset("ISO-8859-1")
            })
            .html("x", "\u{4e2d}"),
    );
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    assert_eq!(response.status, 200);
    match response.source {
        Some(ContentSource::Buffered(bytes)) => assert_eq!(bytes.as_ref(), original),
        other => panic!("expected buffered content, got {other:?}"),
    }
}

#[tokio::test]
async fn test_broken_outer_body_keeps_status() {
    let pipeline = Arc::new(MapPipeline::default().route("page", |_| {
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"A<box href=\"/x\">")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        Response {
            content_type: Some("text/html".to_string()),
            source: Some(ContentSource::Stream(stream::iter(chunks).boxed())),
            ..Response::new(200)
        }
    }));
    let response = engine(&pipeline, AssemblerConfig::default())
        .process(page_request("box"))
        .await;

    assert_eq!(response.status, 200);
    let Some(ContentSource::Stream(mut replay)) = response.source else {
        panic!("expected the body to be handed back as a stream");
    };
    assert_eq!(
        replay.next().await.unwrap().unwrap().as_ref(),
        b"A<box href=\"/x\">"
    );
    assert!(replay.next().await.unwrap().is_err());
    assert_eq!(pipeline.requests().len(), 1);
}
