use crate::e2e::helpers;

use fs2::FileExt;
use helpers::TestContext;
use lingohow_backend::domain::episode::{
    EpisodeListing, EpisodeService, EpisodeServiceApi, EpisodeServiceError,
};
use lingohow_backend::infrastructure::config::EpisodeStoreConfig;
use lingohow_backend::infrastructure::repositories::EpisodeRepository;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use serial_test::serial;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::sync::Arc;

fn sentences(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({ "text": format!("Sentence number {}.", i), "translation": "" }))
        .collect()
}

fn metadata(source: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("source".to_string(), json!(source));
    metadata
}

#[tokio::test]
#[serial]
async fn it_should_save_and_read_an_episode() {
    let ctx = TestContext::new();
    let episodes = &ctx.container.episodes;

    let receipt = episodes.save_episode(1, sentences(3), metadata("import")).await.unwrap();
    assert_eq!(receipt.version, 1);
    assert_eq!(receipt.sentence_count, 3);
    assert_eq!(receipt.file_path, ctx.episode_dir().join("EP1.json"));

    let document = episodes.read_episode(1).await.unwrap();
    assert_eq!(document.episode_id, 1);
    assert_eq!(document.sentences, sentences(3));
    assert_eq!(document.metadata.get("source"), Some(&json!("import")));
    assert_eq!(document.created_at, document.updated_at);
}

#[tokio::test]
#[serial]
async fn it_should_bump_version_and_keep_created_at_on_replace() {
    let ctx = TestContext::new();
    let episodes = &ctx.container.episodes;

    episodes.save_episode(2, sentences(2), Map::new()).await.unwrap();
    let first = episodes.read_episode(2).await.unwrap();

    let receipt = episodes.update_episode(2, sentences(5), metadata("regenerated")).await.unwrap();
    assert_eq!(receipt.version, 2);

    let second = episodes.read_episode(2).await.unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(second.sentences.len(), 5);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
#[serial]
async fn it_should_serialize_concurrent_sentence_updates() {
    let ctx = TestContext::new();
    let episodes = ctx.container.episodes.clone();
    episodes.save_episode(3, sentences(8), Map::new()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|index| {
            let episodes = episodes.clone();
            tokio::spawn(async move {
                episodes
                    .update_sentence(3, index, json!({ "text": format!("Edited {}.", index) }))
                    .await
            })
        })
        .collect();

    let mut versions = BTreeSet::new();
    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        versions.insert(receipt.version);
    }

    // Every writer saw a distinct predecessor: no update was lost
    assert_eq!(versions, (2..=9).collect::<BTreeSet<u64>>());

    let document = episodes.read_episode(3).await.unwrap();
    assert_eq!(document.version, 9);
    for (index, sentence) in document.sentences.iter().enumerate() {
        assert_eq!(sentence["text"], json!(format!("Edited {}.", index)));
    }
}

#[tokio::test]
#[serial]
async fn it_should_report_missing_episodes_as_not_found() {
    let ctx = TestContext::new();
    let episodes = &ctx.container.episodes;

    assert!(matches!(episodes.read_episode(404).await, Err(EpisodeServiceError::NotFound(_))));
    assert!(matches!(
        episodes.update_sentence(404, 0, json!({})).await,
        Err(EpisodeServiceError::NotFound(_))
    ));
    assert!(matches!(episodes.delete_episode(404).await, Err(EpisodeServiceError::NotFound(_))));
    assert!(!episodes.episode_exists(404).await.unwrap());
    assert!(episodes.list_episodes().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn it_should_reject_an_out_of_range_sentence_index() {
    let ctx = TestContext::new();
    let episodes = &ctx.container.episodes;
    episodes.save_episode(4, sentences(3), Map::new()).await.unwrap();

    let err = episodes.update_sentence(4, 3, json!({})).await.unwrap_err();

    match err {
        EpisodeServiceError::Invalid(message) => {
            assert_eq!(message, "Sentence index 3 out of range (0-2)")
        }
        other => panic!("expected Invalid, got {:?}", other),
    }
    assert_eq!(episodes.read_episode(4).await.unwrap().version, 1);
}

#[tokio::test]
#[serial]
async fn it_should_flag_a_corrupt_document_without_hiding_others() {
    let ctx = TestContext::new();
    let episodes = &ctx.container.episodes;
    episodes.save_episode(5, sentences(1), Map::new()).await.unwrap();
    episodes.save_episode(12, sentences(4), Map::new()).await.unwrap();
    std::fs::write(ctx.episode_dir().join("EP7.json"), b"{ not json").unwrap();
    std::fs::write(ctx.episode_dir().join("notes.txt"), b"ignored").unwrap();

    assert!(matches!(episodes.read_episode(7).await, Err(EpisodeServiceError::Integrity(_))));
    assert!(matches!(
        episodes.save_episode(7, sentences(1), Map::new()).await,
        Err(EpisodeServiceError::Integrity(_))
    ));

    let listings = episodes.list_episodes().await.unwrap();
    let ids: Vec<i64> = listings.iter().map(EpisodeListing::episode_id).collect();
    assert_eq!(ids, vec![5, 7, 12]);

    assert!(matches!(listings[1], EpisodeListing::Unreadable { .. }));
    match &listings[2] {
        EpisodeListing::Summary {
            sentence_count,
            version,
            ..
        } => {
            assert_eq!(*sentence_count, 4);
            assert_eq!(*version, 1);
        }
        other => panic!("expected a summary, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn it_should_delete_the_document_and_its_lock_file() {
    let ctx = TestContext::new();
    let episodes = &ctx.container.episodes;
    episodes.save_episode(6, sentences(2), Map::new()).await.unwrap();
    assert!(episodes.episode_exists(6).await.unwrap());

    let receipt = episodes.delete_episode(6).await.unwrap();

    assert_eq!(receipt.episode_id, 6);
    assert!(!episodes.episode_exists(6).await.unwrap());
    assert!(!ctx.episode_dir().join("EP6.json").exists());
    assert!(!ctx.episode_dir().join("EP6.lock").exists());

    // A fresh save starts over at version 1
    let receipt = episodes.save_episode(6, sentences(1), Map::new()).await.unwrap();
    assert_eq!(receipt.version, 1);
}

#[tokio::test]
#[serial]
async fn it_should_time_out_while_another_process_holds_the_lock() {
    let ctx = TestContext::new();
    let config = EpisodeStoreConfig {
        storage_dir: ctx.episode_dir().to_path_buf(),
        write_lock_timeout_secs: 1,
        read_lock_timeout_secs: 1,
        lock_poll_interval_ms: 10,
    };
    let episodes = EpisodeService::new(Arc::new(EpisodeRepository::new(&config)));
    episodes.save_episode(8, sentences(1), Map::new()).await.unwrap();

    let holder = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(ctx.episode_dir().join("EP8.lock"))
        .unwrap();
    FileExt::lock_exclusive(&holder).unwrap();

    let err = episodes.update_sentence(8, 0, json!({})).await.unwrap_err();
    assert!(matches!(err, EpisodeServiceError::LockTimeout(_)));
    assert!(err.is_retryable());

    FileExt::unlock(&holder).unwrap();
    let receipt = episodes.update_sentence(8, 0, json!({ "text": "Now." })).await.unwrap();
    assert_eq!(receipt.version, 2);
}

#[tokio::test]
#[serial]
async fn it_should_read_and_list_documents_with_naive_timestamps() {
    let ctx = TestContext::new();
    let episodes = &ctx.container.episodes;
    std::fs::create_dir_all(ctx.episode_dir()).unwrap();
    std::fs::write(
        ctx.episode_dir().join("EP7.json"),
        r#"{
  "episode_id": 7,
  "sentences": [{"text": "Morning."}],
  "metadata": {"source": "paragraph_generation"},
  "created_at": "2025-11-13T08:00:00.123456",
  "updated_at": "2025-11-13T08:00:00.123456",
  "version": 3
}"#,
    )
    .unwrap();

    let document = episodes.read_episode(7).await.unwrap();
    assert_eq!(document.version, 3);

    let listings = episodes.list_episodes().await.unwrap();
    assert!(matches!(listings[0], EpisodeListing::Summary { version: 3, .. }));

    let receipt = episodes.save_episode(7, sentences(2), Map::new()).await.unwrap();
    assert_eq!(receipt.version, 4);
}
