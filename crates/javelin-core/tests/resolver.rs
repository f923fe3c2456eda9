//! Resolver behavior against in-memory repositories.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{mockito_repository, pom, publish, resolver};
use javelin_core::resolve::{Coordinate, MemoryRepository, Repository, Resolver};
use javelin_core::{KernelConfig, ResolutionError, RetryPolicy};
use tempfile::TempDir;

fn coordinates(texts: &[&str]) -> Vec<Coordinate> {
    texts.iter().map(|t| Coordinate::parse(t).unwrap()).collect()
}

fn resolved(artifacts: &[javelin_core::ResolvedArtifact]) -> Vec<String> {
    artifacts.iter().map(|a| a.coordinate()).collect()
}

#[tokio::test]
async fn test_prefix_range_picks_highest_match() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let resolver = resolver(temp.path(), mockito_repository());

    let artifacts = resolver
        .resolve(&coordinates(&["org.mockito:mockito-core:4.11.+"]))
        .await
        .unwrap();

    assert_eq!(
        resolved(&artifacts),
        vec![
            "org.mockito:mockito-core:4.11.0",
            "net.bytebuddy:byte-buddy:1.12.19",
            "org.objenesis:objenesis:3.3",
        ]
    );
    for artifact in &artifacts {
        let path = artifact.path.as_ref().unwrap();
        assert!(path.is_file());
        assert!(path.starts_with(temp.path()));
    }
}

#[tokio::test]
async fn test_identical_request_is_not_refetched() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = mockito_repository();
    let resolver = resolver(temp.path(), repo.clone());
    let request = coordinates(&["org.mockito:mockito-core:4.11.+"]);

    let first = resolver.resolve(&request).await.unwrap();
    let requests = repo.request_count();
    let second = resolver.resolve(&request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(repo.request_count(), requests);
}

#[tokio::test]
async fn test_archives_survive_a_new_resolver() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = mockito_repository();
    let request = coordinates(&["org.objenesis:objenesis:3.3"]);

    let first = resolver(temp.path(), repo.clone()).resolve(&request).await.unwrap();
    let requests = repo.request_count();
    let second = resolver(temp.path(), repo.clone()).resolve(&request).await.unwrap();

    assert_eq!(first[0].path, second[0].path);
    assert_eq!(repo.request_count(), requests);
}

#[tokio::test]
async fn test_highest_transitive_version_wins() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = MemoryRepository::new("mem");
    publish(&repo, "app", "a", "1", &[("lib", "x", "1.0"), ("app", "b", "1")]);
    publish(&repo, "app", "b", "1", &[("lib", "x", "1.2")]);
    publish(&repo, "lib", "x", "1.0", &[]);
    publish(&repo, "lib", "x", "1.2", &[]);
    let resolver = resolver(temp.path(), Arc::new(repo));

    let artifacts = resolver.resolve(&coordinates(&["app:a:1"])).await.unwrap();
    let names = resolved(&artifacts);

    assert!(names.contains(&"lib:x:1.2".to_string()), "{names:?}");
    assert!(!names.contains(&"lib:x:1.0".to_string()));
}

#[tokio::test]
async fn test_direct_declaration_is_pinned() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = MemoryRepository::new("mem");
    publish(&repo, "app", "a", "1", &[("lib", "x", "1.2")]);
    publish(&repo, "lib", "x", "1.0", &[]);
    publish(&repo, "lib", "x", "1.2", &[]);
    let resolver = resolver(temp.path(), Arc::new(repo));

    let artifacts = resolver
        .resolve(&coordinates(&["app:a:1", "lib:x:1.0"]))
        .await
        .unwrap();
    let names = resolved(&artifacts);

    assert!(names.contains(&"lib:x:1.0".to_string()), "{names:?}");
    assert_eq!(names.len(), 2);
}

#[tokio::test]
async fn test_cycles_terminate() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = MemoryRepository::new("mem");
    publish(&repo, "cyc", "a", "1", &[("cyc", "b", "1")]);
    publish(&repo, "cyc", "b", "1", &[("cyc", "a", "1")]);
    let resolver = resolver(temp.path(), Arc::new(repo));

    let artifacts = resolver.resolve(&coordinates(&["cyc:a:1"])).await.unwrap();
    assert_eq!(resolved(&artifacts), vec!["cyc:a:1", "cyc:b:1"]);
}

#[tokio::test]
async fn test_incompatible_ranges_conflict() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = MemoryRepository::new("mem");
    publish(&repo, "app", "a", "1", &[("lib", "x", "[1.0,2.0)"), ("app", "b", "1")]);
    publish(&repo, "app", "b", "1", &[("lib", "x", "[2.0,3.0)")]);
    publish(&repo, "lib", "x", "1.5", &[]);
    publish(&repo, "lib", "x", "2.5", &[]);
    let resolver = resolver(temp.path(), Arc::new(repo));

    let err = resolver.resolve(&coordinates(&["app:a:1"])).await.unwrap_err();
    assert!(matches!(err, ResolutionError::Conflict { ref artifact, .. } if artifact == "lib:x"), "{err:?}");
}

#[tokio::test]
async fn test_unknown_coordinate_is_not_found() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let resolver = resolver(temp.path(), mockito_repository());

    let err = resolver
        .resolve(&coordinates(&["org.mockito:mockito-core:9.+"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::NotFound { .. }), "{err:?}");

    let err = resolver
        .resolve(&coordinates(&["org.nowhere:ghost:1.0"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::NotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = MemoryRepository::new("flaky");
    repo.publish_pom("lib", "x", "1.0", &pom("lib", "x", "1.0", &[]));
    repo.publish_jar("lib", "x", "1.0", b"x");
    repo.fail_next("lib/x/1.0/x-1.0.jar", 2);

    let mut config = KernelConfig::isolated(temp.path());
    config.retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        multiplier: 2,
    };
    let repositories: Vec<Arc<dyn Repository>> = vec![Arc::new(repo) as Arc<dyn Repository>];
    let resolver = Resolver::with_repositories(&config, repositories);

    let artifacts = resolver.resolve(&coordinates(&["lib:x:1.0"])).await.unwrap();
    assert_eq!(resolved(&artifacts), vec!["lib:x:1.0"]);
}

#[tokio::test]
async fn test_retries_give_up() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let repo = MemoryRepository::new("flaky");
    repo.publish_pom("lib", "x", "1.0", &pom("lib", "x", "1.0", &[]));
    repo.publish_jar("lib", "x", "1.0", b"x");
    repo.fail_next("lib/x/1.0/x-1.0.jar", 5);

    let resolver = resolver(temp.path(), Arc::new(repo));
    let err = resolver.resolve(&coordinates(&["lib:x:1.0"])).await.unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}

#[tokio::test]
#[ignore = "Requires network access to Maven Central"]
async fn test_resolve_from_central() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let mut config = KernelConfig::isolated(temp.path());
    config.offline = false;
    config.repositories = vec![javelin_core::RemoteRepository::central()];
    let resolver = Resolver::new(&config).unwrap();

    let artifacts = resolver
        .resolve(&coordinates(&["org.mockito:mockito-core:4.11.+"]))
        .await
        .unwrap();
    assert_eq!(artifacts[0].version.as_str(), "4.11.0");
}
