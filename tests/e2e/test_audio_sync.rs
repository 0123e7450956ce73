use crate::e2e::helpers;

use helpers::{staged_path, MemoryStore, ScriptedSynthesizer, TestContext, FAKE_MP3};
use lingohow_backend::domain::audio::{AudioSyncApi, AudioSyncError, BatchRecord, StoreKind};
use lingohow_backend::domain::identity::{fingerprint, phrase_fingerprint};
use pretty_assertions::assert_eq;
use serial_test::serial;

fn sentence_key(text: &str) -> String {
    format!("audio/sentences/{}.mp3", fingerprint(text))
}

fn records(texts: &[&str]) -> Vec<BatchRecord> {
    texts.iter().map(|t| BatchRecord::new(*t)).collect()
}

#[tokio::test]
#[serial]
async fn it_should_generate_and_upload_missing_sentences() {
    let ctx = TestContext::new();
    let texts = ["Good morning.", "How was your weekend?", "Let's grab a coffee."];

    let report = ctx.container.audio_sync.sync_batch(records(&texts)).await.unwrap();

    assert_eq!(report.statistics.total_items, 3);
    assert_eq!(report.statistics.newly_generated, 3);
    assert_eq!(report.statistics.store_a.successful, 3);
    assert_eq!(report.statistics.store_b.successful, 3);
    assert_eq!(report.failures().count(), 0);

    for text in texts {
        let key = sentence_key(text);
        assert!(ctx.store_a.contains(&key), "store A is missing {}", key);
        assert!(ctx.store_b().contains(&key), "store B is missing {}", key);
        assert!(staged_path(ctx.sentence_dir(), &fingerprint(text)).exists());

        let item = report.item(&fingerprint(text)).unwrap();
        assert!(item.generated);
        assert!(item.uploaded_store_a && item.uploaded_store_b);
        assert_eq!(
            item.store_a_url.as_deref(),
            Some(format!("https://lingohow.test.r2.cloudflarestorage.com/{}", key).as_str())
        );
    }
}

#[tokio::test]
#[serial]
async fn it_should_do_nothing_on_a_second_run() {
    let ctx = TestContext::new();
    let texts = ["One.", "Two.", "Three.", "Four.", "Five."];

    ctx.container.audio_sync.sync_batch(records(&texts)).await.unwrap();
    let calls_after_first = ctx.synthesizer.call_count();
    let uploads_after_first = (ctx.store_a.uploads().len(), ctx.store_b().uploads().len());

    let report = ctx.container.audio_sync.sync_batch(records(&texts)).await.unwrap();

    assert_eq!(report.statistics.already_present, 5);
    assert_eq!(report.statistics.newly_generated, 0);
    assert_eq!(report.statistics.store_a.total, 0);
    assert_eq!(report.statistics.store_b.total, 0);
    assert_eq!(ctx.synthesizer.call_count(), calls_after_first);
    assert_eq!(
        (ctx.store_a.uploads().len(), ctx.store_b().uploads().len()),
        uploads_after_first
    );
    assert!(report.items.iter().all(|i| i.existed_in_store_a && i.existed_in_store_b));
}

#[tokio::test]
#[serial]
async fn it_should_only_upload_to_the_store_missing_the_object() {
    let ctx = TestContext::new();
    let text = "Where is the train station?";
    ctx.store_a.seed(&sentence_key(text));

    let report = ctx.container.audio_sync.sync_batch(records(&[text])).await.unwrap();
    let item = &report.items[0];

    assert!(item.existed_in_store_a);
    assert!(!item.existed_in_store_b);
    assert!(!item.uploaded_store_a);
    assert!(item.uploaded_store_b);
    assert!(ctx.store_a.uploads().is_empty());
    assert_eq!(ctx.store_b().uploads(), vec![sentence_key(text)]);
    assert_eq!(report.statistics.missing.missing_store_b_only, 1);
}

#[tokio::test]
#[serial]
async fn it_should_reuse_a_staged_file_instead_of_regenerating() {
    let ctx = TestContext::new();
    let text = "I have already been generated.";
    tokio::fs::create_dir_all(ctx.sentence_dir()).await.unwrap();
    tokio::fs::write(staged_path(ctx.sentence_dir(), &fingerprint(text)), FAKE_MP3)
        .await
        .unwrap();

    let report = ctx.container.audio_sync.sync_batch(records(&[text])).await.unwrap();
    let item = &report.items[0];

    assert_eq!(ctx.synthesizer.call_count(), 0);
    assert!(item.existed_locally);
    assert!(!item.generated);
    assert!(item.uploaded_store_a && item.uploaded_store_b);
    assert_eq!(report.statistics.already_staged, 1);
}

#[tokio::test]
#[serial]
async fn it_should_regenerate_over_an_empty_staged_file() {
    let ctx = TestContext::new();
    let text = "A failed write left this behind.";
    tokio::fs::create_dir_all(ctx.sentence_dir()).await.unwrap();
    tokio::fs::write(staged_path(ctx.sentence_dir(), &fingerprint(text)), b"")
        .await
        .unwrap();

    let report = ctx.container.audio_sync.sync_batch(records(&[text])).await.unwrap();

    assert_eq!(ctx.synthesizer.call_count(), 1);
    assert!(report.items[0].generated);
    assert!(!report.items[0].existed_locally);
}

#[tokio::test]
#[serial]
async fn it_should_isolate_a_sentence_whose_generation_times_out() {
    let stuck = "This one never finishes.";
    let ctx = TestContext::with_synthesizer(ScriptedSynthesizer::hanging_on(&[stuck]));
    let texts = ["First.", "Second.", stuck, "Fourth.", "Fifth."];

    let report = ctx.container.audio_sync.sync_batch(records(&texts)).await.unwrap();

    assert_eq!(report.statistics.newly_generated, 4);
    assert_eq!(report.statistics.generation_failed, 1);
    assert_eq!(report.statistics.store_a.successful, 4);
    assert_eq!(report.statistics.store_b.successful, 4);

    let failed = report.item(&fingerprint(stuck)).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("timed out"));
    assert!(!failed.uploaded_store_a && !failed.uploaded_store_b);
    assert!(!ctx.store_a.contains(&sentence_key(stuck)));
    assert!(!ctx.store_b().contains(&sentence_key(stuck)));
    assert!(!staged_path(ctx.sentence_dir(), &fingerprint(stuck)).exists());

    for text in texts.iter().filter(|t| **t != stuck) {
        assert!(ctx.store_a.contains(&sentence_key(text)));
        assert!(ctx.store_b().contains(&sentence_key(text)));
    }
}

#[tokio::test]
#[serial]
async fn it_should_skip_an_unconfigured_store_without_failing_items() {
    let ctx = TestContext::without_store_b();
    let texts = ["See you tomorrow.", "Take care."];

    let report = ctx.container.audio_sync.sync_batch(records(&texts)).await.unwrap();

    assert_eq!(report.statistics.newly_generated, 2);
    assert_eq!(report.statistics.store_a.successful, 2);
    let store_b = report.statistics.uploads(StoreKind::B);
    assert!(!store_b.configured);
    assert_eq!(store_b.skipped_unconfigured, 2);
    assert_eq!(report.failures().count(), 0);

    for item in &report.items {
        assert!(item.uploaded_store_a);
        assert!(!item.uploaded_store_b);
        assert_eq!(item.unconfigured_stores, vec![StoreKind::B]);
        assert_eq!(item.store_b_url, None);
    }
    // Staged for a later run once store B is configured
    for text in texts {
        assert!(staged_path(ctx.sentence_dir(), &fingerprint(text)).exists());
    }
}

#[tokio::test]
#[serial]
async fn it_should_not_reupload_to_a_store_that_has_it_when_the_other_is_unconfigured() {
    let ctx = TestContext::without_store_b();
    let text = "Already replicated to R2.";
    ctx.store_a.seed(&sentence_key(text));

    let report = ctx.container.audio_sync.sync_batch(records(&[text])).await.unwrap();
    let item = &report.items[0];

    assert!(item.existed_in_store_a);
    assert!(!item.uploaded_store_a);
    assert!(!item.uploaded_store_b);
    assert_eq!(item.unconfigured_stores, vec![StoreKind::B]);
    assert_eq!(item.error, None);
    assert!(ctx.store_a.uploads().is_empty());
    assert_eq!(report.statistics.uploads(StoreKind::B).skipped_unconfigured, 1);
}

#[tokio::test]
#[serial]
async fn it_should_report_a_rejected_upload_on_the_item() {
    let ctx = TestContext::with_store_b(MemoryStore::rejecting_uploads("cos"));
    let text = "Nobody may write here.";

    let report = ctx.container.audio_sync.sync_batch(records(&[text])).await.unwrap();
    let item = &report.items[0];

    assert!(item.uploaded_store_a);
    assert!(!item.uploaded_store_b);
    assert!(item.error.as_deref().unwrap().contains("upload failed"));
    assert_eq!(report.statistics.store_b.failed, 1);
    assert_eq!(report.failures().count(), 1);
}

#[tokio::test]
#[serial]
async fn it_should_dedupe_repeated_sentences_and_skip_empty_rows() {
    let ctx = TestContext::new();
    let batch = vec![
        BatchRecord::new("Hello there.").in_episode(1, 1),
        BatchRecord::new("   "),
        BatchRecord::new("  Hello there. ").in_episode(2, 4),
    ];

    let report = ctx.container.audio_sync.sync_batch(batch).await.unwrap();

    assert_eq!(report.statistics.total_items, 3);
    assert_eq!(report.statistics.unique_items, 1);
    assert_eq!(report.statistics.skipped_empty, 1);
    assert_eq!(ctx.synthesizer.call_count(), 1);
    assert_eq!(ctx.store_a.uploads().len(), 1);

    assert_eq!(report.items.len(), 2);
    assert_eq!(report.items[0].fingerprint, report.items[1].fingerprint);
    assert_eq!(report.items[0].episode_id, Some(1));
    assert_eq!(report.items[1].episode_sequence, Some(4));
}

#[tokio::test]
#[serial]
async fn it_should_sync_phrases_under_their_readable_names() {
    let ctx = TestContext::new();
    let phrases = vec![
        "break the ice".to_string(),
        "S.P.F.".to_string(),
        "What's up?".to_string(),
    ];

    let report = ctx.container.audio_sync.sync_phrases(phrases).await.unwrap();

    assert_eq!(report.statistics.newly_generated, 3);
    let stems: Vec<&str> = report.items.iter().map(|i| i.fingerprint.as_str()).collect();
    assert_eq!(stems, vec!["break_the_ice", "SPF", "whats_up"]);

    for stem in stems {
        let key = format!("audio/expressionss/{}.mp3", stem);
        assert!(ctx.store_a.contains(&key), "store A is missing {}", key);
        assert!(ctx.store_b().contains(&key), "store B is missing {}", key);
    }

    let spoken: Vec<&str> = report.items.iter().map(|i| i.spoken_text.as_str()).collect();
    assert_eq!(spoken, vec!["break the ice", "S P F", "What's up?"]);

    let mut sent = ctx.synthesizer.spoken_texts();
    sent.sort();
    assert_eq!(sent, vec!["S P F", "What's up?", "break the ice"]);
}

#[tokio::test]
#[serial]
async fn it_should_sync_a_single_phrase_with_point_lookups() {
    let ctx = TestContext::new();

    let first = ctx
        .container
        .audio_sync
        .sync_phrase("Piece of cake", Some("Matthew"), true)
        .await
        .unwrap();

    assert_eq!(first.clean_filename, "piece_of_cake");
    assert_eq!(first.store_a_key, "audio/expressionss/piece_of_cake.mp3");
    assert!(first.audio_generated);
    assert!(first.uploaded_store_a && first.uploaded_store_b);
    assert_eq!(first.error, None);
    assert_eq!(ctx.synthesizer.voices(), vec!["Matthew".to_string()]);

    let second = ctx
        .container
        .audio_sync
        .sync_phrase("Piece of cake", None, true)
        .await
        .unwrap();

    assert!(second.existed_in_store_a && second.existed_in_store_b);
    assert!(!second.audio_generated);
    assert!(!second.uploaded_store_a && !second.uploaded_store_b);
    assert_eq!(second.fingerprint, first.fingerprint);
    assert_eq!(first.fingerprint, phrase_fingerprint("piece of cake."));
    assert_eq!(ctx.synthesizer.call_count(), 1);
}

#[tokio::test]
#[serial]
async fn it_should_reject_an_empty_phrase() {
    let ctx = TestContext::new();

    let result = ctx.container.audio_sync.sync_phrase("   ", None, true).await;

    assert!(matches!(result, Err(AudioSyncError::Invalid(_))));
    assert_eq!(ctx.synthesizer.call_count(), 0);
}

#[tokio::test]
#[serial]
async fn it_should_report_presence_grouped_by_episode() {
    let ctx = TestContext::new();
    let (in_a, in_both, nowhere, loose) = ("Only in A.", "Everywhere.", "Nowhere yet.", "No episode.");
    ctx.store_a.seed(&sentence_key(in_a));
    ctx.store_a.seed(&sentence_key(in_both));
    ctx.store_b().seed(&sentence_key(in_both));
    // Unrelated objects force several listing pages
    for n in 0..5 {
        ctx.store_a.seed(&format!("audio/sentences/filler{}.mp3", n));
        ctx.store_b().seed(&format!("audio/sentences/filler{}.mp3", n));
    }

    let batch = vec![
        BatchRecord::new(nowhere).in_episode(2, 1),
        BatchRecord::new(in_both).in_episode(1, 2),
        BatchRecord::new(loose),
        BatchRecord::new(in_a).in_episode(1, 1),
    ];

    let report = ctx.container.audio_sync.check_presence(&batch).await.unwrap();

    let keys: Vec<&str> = report.episodes.iter().map(|e| e.episode_key.as_str()).collect();
    assert_eq!(keys, vec!["EP1", "EP2", "unassigned"]);

    let ep1 = report.episode("EP1").unwrap();
    assert_eq!(ep1.total, 2);
    assert_eq!(ep1.fully_present, 1);
    assert_eq!(ep1.in_store_a, 2);
    assert_eq!(ep1.in_store_b, 1);
    assert_eq!(ep1.sentences[0].text, in_a);

    assert_eq!(report.episode("EP2").unwrap().missing, 1);
    assert_eq!(report.missing.missing_both, 2);
    assert_eq!(report.missing.missing_store_b_only, 1);
    assert_eq!(report.store_status[0].known_objects, 7);

    assert_eq!(ctx.synthesizer.call_count(), 0);
    assert!(ctx.store_a.uploads().is_empty());
}
