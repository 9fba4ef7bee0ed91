//! Integration tests for bndl-fileops

use std::time::Duration;

use bndl_fileops::{
    atomic_write, copy_file, read_text, write_text, PathState, PendingDeleteJournal, RetryPolicy,
    TextEncoding,
};

#[tokio::test]
async fn staged_config_rewrite_preserves_encoding() {
    // An installer updating a config file it did not create must write it
    // back exactly the way it found it.
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("settings.ini");
    tokio::fs::write(&config, [0xFF, 0xFE, b'a', 0, b'=', 0, b'1', 0])
        .await
        .unwrap();

    let (text, encoding) = read_text(&config).await.unwrap();
    assert_eq!(text, "a=1");
    assert_eq!(encoding, TextEncoding::Utf16WithBom);

    let updated = text.replace("a=1", "a=2");
    write_text(&config, &updated, encoding, RetryPolicy::default())
        .await
        .unwrap();

    let raw = tokio::fs::read(&config).await.unwrap();
    assert_eq!(raw, [0xFF, 0xFE, b'a', 0, b'=', 0, b'2', 0]);
}

#[tokio::test]
async fn pending_delete_survives_into_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let journal_path = dir.path().join("state/pending.json");
    let stale = dir.path().join("stale-helper.bin");
    tokio::fs::write(&stale, b"old helper").await.unwrap();

    // First session cannot delete (simulated by scheduling directly).
    {
        let journal = PendingDeleteJournal::new(&journal_path);
        journal.schedule(&stale).await.unwrap();
        assert_eq!(
            journal.path_state(&stale).await.unwrap(),
            PathState::PendingDelete
        );
    }

    // Next session drains before doing anything else.
    {
        let journal = PendingDeleteJournal::new(&journal_path);
        let report = journal
            .drain(RetryPolicy::new(1, Duration::from_millis(1)))
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(journal.path_state(&stale).await.unwrap(), PathState::Absent);
    }
}

#[tokio::test]
async fn copy_then_atomic_publish() {
    // Stage a payload next to its destination, then publish atomically.
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("downloaded.bin");
    tokio::fs::write(&source, vec![0xAB; 1024]).await.unwrap();

    let staged = dir.path().join("install/payload.bin");
    let copied = copy_file(&source, &staged, false, RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(copied, 1024);

    let manifest = dir.path().join("install/manifest.json");
    atomic_write(&manifest, br#"{"payloads":["payload.bin"]}"#)
        .await
        .unwrap();
    assert!(manifest.exists());
    assert_eq!(
        tokio::fs::read(&staged).await.unwrap(),
        vec![0xAB; 1024]
    );
}
