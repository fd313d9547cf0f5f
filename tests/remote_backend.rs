//! Remote backend against a mock sandbox service API: NDJSON command
//! streaming, file transfer, host lookup, keep-alive leases, and the
//! degraded stop capability.

use buildbox::config::SandboxConfig;
use buildbox::error::SandboxError;
use buildbox::exec::StreamEvent;
use buildbox::keepalive::{lease_key, InMemoryKeyValueStore, KeyValueStore};
use buildbox::sandbox::remote::RemoteSettings;
use buildbox::sandbox::resolver::{ResolverOptions, SandboxResolver};
use buildbox::sandbox::service::SandboxService;
use std::sync::Arc;
use tokio_stream::StreamExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SANDBOX_ID: &str = "sb-remote";

async fn mock_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/sandboxes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"sandbox_id": SANDBOX_ID})),
        )
        .mount(server)
        .await;
}

fn remote_service(server: &MockServer, store: Arc<InMemoryKeyValueStore>) -> SandboxService {
    let store: Arc<dyn KeyValueStore> = store;
    let resolver = Arc::new(SandboxResolver::new(ResolverOptions::remote(
        RemoteSettings::new("test-key").with_api_base(server.uri()),
        store,
    )));
    let config = SandboxConfig::default().with_sandbox_id(SANDBOX_ID);
    SandboxService::new(resolver, config)
}

fn ndjson(lines: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(lines.join("\n") + "\n", "application/x-ndjson")
}

#[tokio::test]
async fn command_stream_arrives_in_production_order() {
    let server = MockServer::start().await;
    mock_create(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/commands")))
        .respond_with(ndjson(&[
            r#"{"type":"start","pid":42}"#,
            r#"{"type":"stdout","text":"a"}"#,
            r#"{"type":"stderr","text":"warning"}"#,
            r#"{"type":"stdout","text":"b"}"#,
            r#"{"type":"exit","exit_code":0}"#,
        ]))
        .mount(&server)
        .await;

    let service = remote_service(&server, Arc::new(InMemoryKeyValueStore::new()));
    let (_handle, mut events) = service.bash().sh_streaming("build").await.unwrap();

    assert!(matches!(
        events.next().await.unwrap(),
        StreamEvent::Status { .. }
    ));
    let rest: Vec<StreamEvent> = events.collect().await;
    let shapes: Vec<String> = rest
        .iter()
        .map(|event| match event {
            StreamEvent::Stdout { text } => format!("out:{text}"),
            StreamEvent::Stderr { text } => format!("err:{text}"),
            StreamEvent::Status { .. } => "status".to_string(),
        })
        .collect();
    assert_eq!(shapes, vec!["out:a", "err:warning", "out:b"]);
}

#[tokio::test]
async fn blocking_run_accumulates_the_stream() {
    let server = MockServer::start().await;
    mock_create(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/commands")))
        .respond_with(ndjson(&[
            r#"{"type":"stdout","text":"line one"}"#,
            r#"{"type":"stdout","text":"line two"}"#,
            r#"{"type":"exit","exit_code":7}"#,
        ]))
        .mount(&server)
        .await;

    let service = remote_service(&server, Arc::new(InMemoryKeyValueStore::new()));
    let result = service.bash().sh("failing build").await.unwrap();
    assert_eq!(result.exit_code, 7);
    assert_eq!(result.stdout, "line one\nline two");
    assert!(result.error.is_none());
}

#[tokio::test]
async fn stream_without_exit_event_is_an_execution_error() {
    let server = MockServer::start().await;
    mock_create(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/commands")))
        .respond_with(ndjson(&[r#"{"type":"stdout","text":"partial"}"#]))
        .mount(&server)
        .await;

    let service = remote_service(&server, Arc::new(InMemoryKeyValueStore::new()));
    let result = service.bash().sh("truncated").await.unwrap();
    assert_eq!(result.exit_code, -1);
    assert!(result.error.unwrap().contains("without an exit event"));
    // Partial output is still visible.
    assert_eq!(result.stdout, "partial");
}

#[tokio::test]
async fn file_roundtrip_uses_the_files_endpoints() {
    let server = MockServer::start().await;
    mock_create(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/files")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/files")))
        .and(query_param("path", "src/app.rs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fn main() {}"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/files")))
        .and(query_param("path", "missing.rs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let service = remote_service(&server, Arc::new(InMemoryKeyValueStore::new()));
    service.fs().write_file("src/app.rs", "fn main() {}").await.unwrap();
    assert_eq!(
        service.fs().read_file("src/app.rs").await.unwrap(),
        "fn main() {}"
    );

    let err = service.fs().read_file("missing.rs").await.unwrap_err();
    assert!(matches!(err, SandboxError::FileNotFound { .. }));
}

#[tokio::test]
async fn host_lookup_is_best_effort() {
    let server = MockServer::start().await;
    mock_create(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/hosts/3000")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"host": "3000-sb.preview.example"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/hosts/4000")))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let service = remote_service(&server, Arc::new(InMemoryKeyValueStore::new()));
    assert_eq!(
        service.dev().host(3000).await.unwrap().as_deref(),
        Some("https://3000-sb.preview.example")
    );
    // A failed lookup is None, not an error.
    assert_eq!(service.dev().host(4000).await.unwrap(), None);
}

#[tokio::test]
async fn creation_writes_a_keep_alive_lease() {
    let server = MockServer::start().await;
    mock_create(&server).await;

    let store = Arc::new(InMemoryKeyValueStore::new());
    let service = remote_service(&server, store.clone());
    service.get_sandbox().await.unwrap();

    let lease = store.get(&lease_key(SANDBOX_ID)).await.unwrap();
    assert!(lease.is_some(), "creation must cover the container");
}

#[tokio::test]
async fn remote_stop_awaits_natural_completion() {
    let server = MockServer::start().await;
    mock_create(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}/commands")))
        .respond_with(
            ndjson(&[
                r#"{"type":"stdout","text":"working"}"#,
                r#"{"type":"exit","exit_code":0}"#,
            ])
            .set_delay(std::time::Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let service = remote_service(&server, Arc::new(InMemoryKeyValueStore::new()));
    let sandbox = service.get_sandbox().await.unwrap();
    assert!(!sandbox.capabilities().can_terminate_commands);

    let (handle, _events) = service.bash().sh_streaming("slow job").await.unwrap();
    // Stop cannot kill the remote process; it waits for the real exit.
    let result = service.bash().stop(&handle.id).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "working");
    assert!(!sandbox.exec().is_running(&handle.id));
}

#[tokio::test]
async fn terminate_deletes_the_container() {
    let server = MockServer::start().await;
    mock_create(&server).await;
    Mock::given(method("DELETE"))
        .and(path(format!("/v1/sandboxes/{SANDBOX_ID}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let service = remote_service(&server, Arc::new(InMemoryKeyValueStore::new()));
    let sandbox = service.get_sandbox().await.unwrap();
    assert!(sandbox.status().active);

    service.stop().await.unwrap();
    assert!(!sandbox.status().active);
    assert!(service.sandbox_id().await.is_none());
}
