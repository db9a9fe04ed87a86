use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use morph::testing::TestPlatform;
use morph_api::FieldDescriptor;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resolves_never_go_backwards_across_redefinitions() -> Result<()> {
    let platform = Arc::new(TestPlatform::new());
    platform
        .define("post", vec![FieldDescriptor::string("f0")])
        .await?;

    let writer = {
        let platform = platform.clone();
        tokio::spawn(async move {
            for generation in 1..=20 {
                let fields = (0..=generation)
                    .map(|i| FieldDescriptor::string(format!("f{}", i)))
                    .collect();
                platform
                    .platform
                    .schemas
                    .redefine("post", fields)
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let readers = (0..4).map(|_| {
        let platform = platform.clone();
        tokio::spawn(async move {
            let mut last_revision = 0;
            for _ in 0..50 {
                let handle = platform.platform.registry.resolve("post").await.unwrap();
                assert!(handle.revision >= last_revision);
                last_revision = handle.revision;
                tokio::task::yield_now().await;
            }
        })
    });

    writer.await?;
    for reader in join_all(readers).await {
        reader?;
    }

    let handle = platform.platform.registry.resolve("post").await?;
    assert!(handle.artifacts.storage_schema.field("f20").is_some());
    let stored = platform.platform.catalog.get("post").await?.unwrap();
    assert_eq!(handle.revision, stored.revision);
    Ok(())
}

#[tokio::test]
async fn test_removed_type_stops_resolving() -> Result<()> {
    let platform = TestPlatform::new();
    platform
        .define("post", vec![FieldDescriptor::string("title")])
        .await?;
    platform.platform.registry.resolve("post").await?;

    platform.platform.schemas.remove("post").await?;
    let err = platform.platform.registry.resolve("post").await.unwrap_err();
    assert_eq!(err.code(), "unknown_entity");
    assert!(platform.platform.registry.cached_names().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unchanged_definition_compiles_once() -> Result<()> {
    let platform = TestPlatform::new();
    platform
        .define("post", vec![FieldDescriptor::string("title")])
        .await?;
    let registry = &platform.platform.registry;

    for _ in 0..5 {
        registry.resolve("post").await?;
    }
    assert_eq!(registry.compilation_count(), 1);

    platform
        .platform
        .schemas
        .redefine("post", vec![FieldDescriptor::string("headline")])
        .await?;
    let handle = registry.resolve("post").await?;
    assert_eq!(registry.compilation_count(), 2);
    assert!(handle.artifacts.storage_schema.field("headline").is_some());
    Ok(())
}
