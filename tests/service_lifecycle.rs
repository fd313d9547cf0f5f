//! Service facade lifecycle: lazy resolution, status snapshots, refresh,
//! lifetime-bounded reuse, and config swaps.

use buildbox::config::SandboxConfig;
use buildbox::sandbox::resolver::{ResolverOptions, SandboxResolver};
use buildbox::sandbox::service::SandboxService;
use std::sync::Arc;
use std::time::Duration;

fn local_service_with(config: SandboxConfig) -> SandboxService {
    let resolver = Arc::new(SandboxResolver::new(ResolverOptions::local()));
    SandboxService::new(resolver, config)
}

#[tokio::test]
async fn status_is_inactive_until_first_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let service =
        local_service_with(SandboxConfig::default().with_workspace_path(dir.path()));

    let status = service.status().await;
    assert!(!status.active);
    assert!(status.sandbox_id.is_none());
    assert!(!service.is_active().await);

    service.get_sandbox().await.unwrap();
    let status = service.status().await;
    assert!(status.active);
    assert!(status.reusable);
    assert!(status.sandbox_id.is_some());
}

#[tokio::test]
async fn operations_bump_last_activity() {
    let dir = tempfile::tempdir().unwrap();
    let service =
        local_service_with(SandboxConfig::default().with_workspace_path(dir.path()));

    service.bash().sh("true").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let idle = service.status().await.last_activity;
    assert!(idle >= Duration::from_millis(40));

    service.bash().sh("true").await.unwrap();
    let after = service.status().await.last_activity;
    assert!(after < idle);
}

#[tokio::test]
async fn refresh_builds_a_fresh_instance() {
    let dir = tempfile::tempdir().unwrap();
    let service =
        local_service_with(SandboxConfig::default().with_workspace_path(dir.path()));

    let first = service.get_sandbox().await.unwrap();
    let second = service.refresh(None).await.unwrap();
    assert!(!first.ptr_eq(&second));
    assert!(!first.status().active, "refresh terminates the old instance");

    let third = service.get_sandbox().await.unwrap();
    assert!(second.ptr_eq(&third));
}

#[tokio::test]
async fn expired_lifetime_forces_recreation_on_access() {
    let dir = tempfile::tempdir().unwrap();
    let config = SandboxConfig::default()
        .with_workspace_path(dir.path())
        .with_max_lifetime(Duration::from_millis(250));
    let service = local_service_with(config);

    let first = service.get_sandbox().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!first.status().reusable);

    let second = service.get_sandbox().await.unwrap();
    assert!(!first.ptr_eq(&second));
    // The replacement starts a fresh lifetime window.
    assert!(second.status().reusable);
}

#[tokio::test]
async fn set_config_takes_effect_on_next_resolution() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let service =
        local_service_with(SandboxConfig::default().with_workspace_path(dir_a.path()));

    let first = service.get_sandbox().await.unwrap();
    service.set_config(SandboxConfig::default().with_workspace_path(dir_b.path()));

    let second = service.get_sandbox().await.unwrap();
    assert!(!first.ptr_eq(&second));
    assert_eq!(
        second.backend().workspace(),
        dir_b.path().to_string_lossy()
    );
    // The first sandbox was not terminated, only left behind.
    assert!(first.status().active);
}

#[tokio::test]
async fn dispose_drops_the_handle_without_terminating() {
    let dir = tempfile::tempdir().unwrap();
    let service =
        local_service_with(SandboxConfig::default().with_workspace_path(dir.path()));

    let sandbox = service.get_sandbox().await.unwrap();
    service.dispose();
    assert!(service.sandbox_id().await.is_none());
    assert!(sandbox.status().active);
}
