//! Adding real PDF files through the document store and the bulk folder loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use papershelf::collection::{Collection, SqliteCollection};
use papershelf::embedding::DisabledEmbedder;
use papershelf::ingest::{self, BulkRun, CancelFlag};
use papershelf::models::{MetadataOverrides, Source};
use papershelf::progress::NoProgress;
use papershelf::store::{DocumentStore, IngestError};
use tempfile::TempDir;

async fn open_store(tmp: &TempDir) -> DocumentStore {
    let collection = SqliteCollection::open(
        &tmp.path().join("data/shelf.sqlite"),
        "knowledge",
        Arc::new(DisabledEmbedder),
        16,
    )
    .await
    .unwrap();
    DocumentStore::with_limits(Arc::new(collection), 8000, 100)
}

#[tokio::test]
async fn pdf_with_enough_text_is_added() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let path = tmp.path().join("sparse-attention.pdf");
    std::fs::write(&path, common::paper_pdf("sparse attention")).unwrap();

    let added = store.add(&path, &MetadataOverrides::default()).await.unwrap();

    assert!(added.id.starts_with("sparse-attention_"));
    assert_eq!(added.record_ids, vec![added.id.clone()]);
    assert_eq!(added.metadata.source, "manual_upload");
    assert_eq!(added.metadata.file, "sparse-attention.pdf");
    assert_eq!(added.metadata.hash.len(), 32);

    let doc = store.get_document(&added.id).await.unwrap();
    assert!(doc.text().contains("sparse attention"));
}

#[tokio::test]
async fn short_pdf_is_rejected_and_not_stored() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let path = tmp.path().join("tiny.pdf");
    std::fs::write(&path, common::short_pdf()).unwrap();

    let err = store.add(&path, &MetadataOverrides::default()).await.unwrap_err();

    assert!(matches!(err, IngestError::InsufficientText { .. }));
    assert_eq!(store.collection().count().await.unwrap(), 0);
}

#[tokio::test]
async fn same_content_under_another_name_is_duplicate() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let bytes = common::paper_pdf("graph networks");
    let first = tmp.path().join("first.pdf");
    let copy = tmp.path().join("copy.pdf");
    std::fs::write(&first, &bytes).unwrap();
    std::fs::write(&copy, &bytes).unwrap();

    let added = store.add(&first, &MetadataOverrides::default()).await.unwrap();
    let err = store.add(&copy, &MetadataOverrides::default()).await.unwrap_err();

    assert_eq!(
        err,
        IngestError::Duplicate {
            existing_id: added.id.clone()
        }
    );
    assert_eq!(store.list_documents(10, 0).await.total, 1);
}

#[tokio::test]
async fn overrides_replace_extracted_metadata() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let path = tmp.path().join("2301.07041v2.pdf");
    std::fs::write(&path, common::paper_pdf("protein folding")).unwrap();

    let overrides = MetadataOverrides {
        title: Some("Folding Proteins Quickly".to_string()),
        authors: Some("Ada Lovelace, Alan Turing".to_string()),
        source: Some(Source::Arxiv),
        arxiv_id: Some("2301.07041v2".to_string()),
    };
    let added = store.add(&path, &overrides).await.unwrap();

    assert_eq!(added.id, "2301.07041v2");
    assert_eq!(added.metadata.title, "Folding Proteins Quickly");
    assert_eq!(added.metadata.author, "Ada Lovelace, Alan Turing");
    assert_eq!(added.metadata.source, "arxiv");
}

#[tokio::test]
async fn add_folder_reports_each_outcome() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let downloads = tmp.path().join("downloads");
    std::fs::create_dir_all(downloads.join("older")).unwrap();
    std::fs::write(downloads.join("a.pdf"), common::paper_pdf("reinforcement learning")).unwrap();
    std::fs::write(downloads.join("older/b.pdf"), common::paper_pdf("reinforcement learning")).unwrap();
    std::fs::write(downloads.join("c.pdf"), common::paper_pdf("diffusion models")).unwrap();
    std::fs::write(downloads.join("d.pdf"), common::short_pdf()).unwrap();

    let run = BulkRun::new(&NoProgress, CancelFlag::new(), Duration::ZERO);
    let report = ingest::add_folder(&store, &downloads, &run).await.unwrap();

    assert_eq!(report.attempted, 4);
    assert_eq!(report.added, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.cancelled);

    let page = store.list_documents(10, 0).await;
    assert_eq!(page.total, 2);
    assert!(page
        .documents
        .iter()
        .all(|d| d.metadata.source == "download_folder"));
}

#[tokio::test]
async fn documents_survive_reopen_and_delete_cleanly() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("kept.pdf");
    std::fs::write(&path, common::paper_pdf("program synthesis")).unwrap();

    let id = {
        let store = open_store(&tmp).await;
        store.add(&path, &MetadataOverrides::default()).await.unwrap().id
    };

    let store = open_store(&tmp).await;
    assert_eq!(store.list_documents(10, 0).await.ids(), vec![id.as_str()]);
    assert!(store.delete(&id).await);
    assert!(store.get_document(&id).await.is_none());
    assert_eq!(store.collection().count().await.unwrap(), 0);
}
