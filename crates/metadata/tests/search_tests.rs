//! Search projection and queries.

mod common;

use common::{TestMetadata, id, package, version};
use keg_core::{PackageType, SemVerLevel};
use keg_metadata::{MetadataError, PackageDatabase, SearchIndexer, SearchRequest, SearchService};

async fn add_indexed(metadata: &TestMetadata, package: keg_core::Package) {
    let store = metadata.store();
    store.add_package(&package).await.unwrap();
    store.index(&package).await.unwrap();
}

fn query(q: &str) -> SearchRequest {
    SearchRequest {
        query: q.to_string(),
        include_prerelease: true,
        include_semver2: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn search_groups_versions_by_id() {
    let metadata = TestMetadata::new().await.unwrap();
    add_indexed(&metadata, package("Foo", "1.0.0")).await;
    add_indexed(&metadata, package("foo", "2.0.0")).await;
    add_indexed(&metadata, package("Bar", "1.0.0")).await;

    let response = metadata.store().search(&query("foo")).await.unwrap();
    assert_eq!(response.total_hits, 1);
    let result = &response.data[0];
    assert_eq!(result.latest.version.normalized(), "2.0.0");
    assert_eq!(result.versions.len(), 2);
    assert_eq!(result.versions[0].version, version("1.0.0"));
    assert_eq!(result.latest.dependencies.len(), 2);
}

#[tokio::test]
async fn search_matches_all_terms_case_insensitively() {
    let metadata = TestMetadata::new().await.unwrap();
    let mut json = package("Fast.Json", "1.0.0");
    json.tags = vec!["Serializer".to_string()];
    add_indexed(&metadata, json).await;
    add_indexed(&metadata, package("Fast.Xml", "1.0.0")).await;

    let response = metadata.store().search(&query("FAST serializer")).await.unwrap();
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0].id, id("fast.json"));

    let everything = metadata.store().search(&query("")).await.unwrap();
    assert_eq!(everything.total_hits, 2);
}

#[tokio::test]
async fn search_excludes_unlisted_and_unindexed() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();

    add_indexed(&metadata, package("Hidden", "1.0.0")).await;
    store
        .update_listed(&id("Hidden"), &version("1.0.0"), false)
        .await
        .unwrap();

    // Stored but never projected into the index.
    store.add_package(&package("Pending", "1.0.0")).await.unwrap();

    assert!(store.search(&query("hidden")).await.unwrap().data.is_empty());
    assert!(store.search(&query("pending")).await.unwrap().data.is_empty());
    assert!(store.autocomplete("pend", 0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_prerelease_and_semver2_filters() {
    let metadata = TestMetadata::new().await.unwrap();
    add_indexed(&metadata, package("Foo", "1.0.0")).await;
    add_indexed(&metadata, package("Foo", "2.0.0-beta")).await;
    let mut semver2 = package("Foo", "3.0.0");
    semver2.semver_level = SemVerLevel::SemVer2;
    add_indexed(&metadata, semver2).await;

    let store = metadata.store();
    let stable_only = store
        .search(&SearchRequest {
            query: "foo".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stable_only.data[0].latest.version.normalized(), "1.0.0");

    let with_prerelease = store
        .search(&SearchRequest {
            query: "foo".to_string(),
            include_prerelease: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(with_prerelease.data[0].latest.version.normalized(), "2.0.0-beta");

    let everything = store.search(&query("foo")).await.unwrap();
    assert_eq!(everything.data[0].latest.version.normalized(), "3.0.0");
}

#[tokio::test]
async fn search_filters_package_type() {
    let metadata = TestMetadata::new().await.unwrap();
    let mut tool = package("My.Tool", "1.0.0");
    tool.package_types = vec![PackageType {
        name: "DotnetTool".to_string(),
        version: None,
    }];
    add_indexed(&metadata, tool).await;
    add_indexed(&metadata, package("My.Lib", "1.0.0")).await;

    let response = metadata
        .store()
        .search(&SearchRequest {
            package_type: Some("dotnettool".to_string()),
            ..query("my")
        })
        .await
        .unwrap();
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0].id, id("My.Tool"));
}

#[tokio::test]
async fn search_orders_by_downloads_and_pages() {
    let metadata = TestMetadata::new().await.unwrap();
    let store = metadata.store();
    for name in ["Alpha", "Beta", "Gamma"] {
        add_indexed(&metadata, package(name, "1.0.0")).await;
    }
    for _ in 0..3 {
        store
            .increment_downloads(&id("Gamma"), &version("1.0.0"))
            .await
            .unwrap();
    }

    let first = store
        .search(&SearchRequest {
            take: 2,
            ..query("")
        })
        .await
        .unwrap();
    assert_eq!(first.total_hits, 3);
    let ids: Vec<&str> = first.data.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["Gamma", "Alpha"]);
    assert_eq!(first.data[0].total_downloads, 3);

    let second = store
        .search(&SearchRequest {
            skip: 2,
            take: 2,
            ..query("")
        })
        .await
        .unwrap();
    assert_eq!(second.data.len(), 1);
    assert_eq!(second.data[0].id.as_str(), "Beta");
}

#[tokio::test]
async fn reindex_is_an_upsert() {
    let metadata = TestMetadata::new().await.unwrap();
    let mut foo = package("Foo", "1.0.0");
    add_indexed(&metadata, foo.clone()).await;

    foo.description = "now mentions zebras".to_string();
    metadata.store().index(&foo).await.unwrap();

    let response = metadata.store().search(&query("zebras")).await.unwrap();
    assert_eq!(response.total_hits, 1);
}

#[tokio::test]
async fn index_requires_stored_package() {
    let metadata = TestMetadata::new().await.unwrap();
    let err = metadata
        .store()
        .index(&package("Ghost", "1.0.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

#[tokio::test]
async fn autocomplete_dedupes_ids() {
    let metadata = TestMetadata::new().await.unwrap();
    add_indexed(&metadata, package("Newtonsoft.Json", "12.0.0")).await;
    add_indexed(&metadata, package("Newtonsoft.Json", "13.0.1")).await;
    add_indexed(&metadata, package("System.Text.Json", "8.0.0")).await;
    add_indexed(&metadata, package("Serilog", "3.0.0")).await;

    let ids = metadata.store().autocomplete("json", 0, 10).await.unwrap();
    assert_eq!(ids, vec!["Newtonsoft.Json", "System.Text.Json"]);

    let paged = metadata.store().autocomplete("json", 1, 10).await.unwrap();
    assert_eq!(paged, vec!["System.Text.Json"]);

    // LIKE wildcards in the query are literal.
    assert!(metadata.store().autocomplete("%", 0, 10).await.unwrap().is_empty());
}
