//! Resolver caching: concurrent creation collapses to one instance, and a
//! failed creation is evicted rather than replayed.

use buildbox::config::SandboxConfig;
use buildbox::keepalive::{InMemoryKeyValueStore, KeyValueStore};
use buildbox::sandbox::remote::RemoteSettings;
use buildbox::sandbox::resolver::{ResolverOptions, SandboxResolver};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_resolver(server: &MockServer) -> SandboxResolver {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
    SandboxResolver::new(ResolverOptions::remote(
        RemoteSettings::new("test-key").with_api_base(server.uri()),
        store,
    ))
}

#[tokio::test]
async fn concurrent_local_resolves_share_one_instance() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = SandboxResolver::new(ResolverOptions::local());
    let config = SandboxConfig::default()
        .with_workspace_path(dir.path())
        .with_sandbox_id("shared");

    let (a, b) = tokio::join!(resolver.resolve(&config), resolver.resolve(&config));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.ptr_eq(&b));

    let later = resolver.resolve(&config).await.unwrap();
    assert!(later.ptr_eq(&a));
}

#[tokio::test]
async fn different_identity_fields_get_different_instances() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = SandboxResolver::new(ResolverOptions::local());
    let base = SandboxConfig::default().with_workspace_path(dir.path());

    let one = resolver
        .resolve(&base.clone().with_sandbox_id("one"))
        .await
        .unwrap();
    let two = resolver
        .resolve(&base.with_sandbox_id("two"))
        .await
        .unwrap();
    assert!(!one.ptr_eq(&two));
}

#[tokio::test]
async fn concurrent_remote_resolves_trigger_exactly_one_creation_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/sandboxes"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"sandbox_id": "sb-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resolver = remote_resolver(&server);
    let config = SandboxConfig::default().with_sandbox_id("sb-1");

    let (a, b) = tokio::join!(resolver.resolve(&config), resolver.resolve(&config));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.ptr_eq(&b));
    assert_eq!(a.id(), "sb-1");
    // MockServer verifies expect(1) on drop.
}

#[tokio::test]
async fn failed_creation_is_evicted_and_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/sandboxes"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sandboxes"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"sandbox_id": "sb-2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resolver = remote_resolver(&server);
    let config = SandboxConfig::default().with_sandbox_id("sb-2");

    let err = resolver.resolve(&config).await.unwrap_err();
    assert!(err.to_string().contains("500"));

    // Not a cached rejection: the second call reaches the service again.
    let sandbox = resolver.resolve(&config).await.unwrap();
    assert_eq!(sandbox.id(), "sb-2");
}

#[tokio::test]
async fn evict_returns_the_cached_instance() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = SandboxResolver::new(ResolverOptions::local());
    let config = SandboxConfig::default().with_workspace_path(dir.path());

    assert!(resolver.peek(&config).is_none());
    let sandbox = resolver.resolve(&config).await.unwrap();
    assert!(resolver.peek(&config).unwrap().ptr_eq(&sandbox));

    let evicted = resolver.evict(&config).unwrap();
    assert!(evicted.ptr_eq(&sandbox));
    assert!(resolver.peek(&config).is_none());

    // Resolving again builds a fresh instance.
    let fresh = resolver.resolve(&config).await.unwrap();
    assert!(!fresh.ptr_eq(&sandbox));
}
