use std::time::Duration;
use tg_broadcast::templates::{TemplateError, TemplateStore};

async fn setup_store() -> TemplateStore {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    TemplateStore::new(pool)
}

// Keeps updated_at strictly increasing between writes.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn create_and_list_templates() {
    let store = setup_store().await;
    let welcome = store.create_or_update("welcome", "Hello", None).await.unwrap();
    tick().await;
    let update = store
        .create_or_update("update", "Latest news", None)
        .await
        .unwrap();

    assert_eq!(welcome.version, 1);
    assert_eq!(welcome.parse_mode, "MarkdownV2");
    assert!(!welcome.was_sent && welcome.sent_at.is_none());
    assert!(!update.was_sent && update.sent_at.is_none());

    let names: Vec<String> = store
        .list(true)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["update", "welcome"]);
}

#[tokio::test]
async fn recreating_bumps_version_and_resets_sent_state() {
    let store = setup_store().await;
    let first = store.create_or_update("welcome", "Hello", None).await.unwrap();
    assert_eq!(store.get("welcome").await.unwrap().version, 1);

    store.mark_sent(&[first.id]).await.unwrap();
    let sent = store.get("welcome").await.unwrap();
    assert!(sent.was_sent && sent.sent_at.is_some());

    tick().await;
    let second = store
        .create_or_update("welcome", "Hi", Some("HTML"))
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.version, 2);
    assert_eq!(second.text, "Hi");
    assert_eq!(second.parse_mode, "HTML");
    assert!(!second.was_sent);
    assert!(second.sent_at.is_none());
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > sent.updated_at);

    let third = store.create_or_update("welcome", "Hey", None).await.unwrap();
    assert_eq!(third.version, 3);
    assert_eq!(third.parse_mode, "MarkdownV2");
}

#[tokio::test]
async fn mark_sent_sets_flags_and_is_idempotent() {
    let store = setup_store().await;
    let a = store.create_or_update("a", "A", None).await.unwrap();
    let b = store.create_or_update("b", "B", None).await.unwrap();

    let updated = store.mark_sent(&[b.id, a.id]).await.unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[0].id, a.id);
    assert_eq!(updated[1].id, b.id);
    for tpl in &updated {
        assert!(tpl.was_sent);
        assert!(tpl.sent_at.is_some());
    }
    assert!(store.list(false).await.unwrap().is_empty());

    let again = store.mark_sent(&[a.id, b.id]).await.unwrap();
    assert_eq!(again.len(), 2);
    assert!(again.iter().all(|t| t.was_sent && t.sent_at.is_some()));
    assert!(again.iter().all(|t| t.version == 1));
}

#[tokio::test]
async fn mark_sent_empty_and_unknown_ids() {
    let store = setup_store().await;
    let a = store.create_or_update("a", "A", None).await.unwrap();

    assert!(store.mark_sent(&[]).await.unwrap().is_empty());
    assert!(!store.get("a").await.unwrap().was_sent);

    let updated = store.mark_sent(&[a.id, 999]).await.unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].id, a.id);
}

#[tokio::test]
async fn list_without_sent_filters_sent_templates() {
    let store = setup_store().await;
    let a = store.create_or_update("a", "A", None).await.unwrap();
    store.create_or_update("b", "B", None).await.unwrap();
    store.mark_sent(&[a.id]).await.unwrap();

    let unsent = store.list(false).await.unwrap();
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].name, "b");
    assert!(unsent.iter().all(|t| !t.was_sent));
    assert_eq!(store.list(true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn list_orders_by_updated_at_then_id() {
    let store = setup_store().await;
    let a = store.create_or_update("a", "A", None).await.unwrap();
    let b = store.create_or_update("b", "B", None).await.unwrap();
    let c = store.create_or_update("c", "C", None).await.unwrap();

    // One mark_sent call stamps every row with the same updated_at.
    store.mark_sent(&[c.id, a.id, b.id]).await.unwrap();
    let ids: Vec<i64> = store.list(true).await.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);

    tick().await;
    store.create_or_update("b", "B2", None).await.unwrap();
    let ids: Vec<i64> = store.list(true).await.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![b.id, a.id, c.id]);
}

#[tokio::test]
async fn delete_templates_by_id() {
    let store = setup_store().await;
    let a = store.create_or_update("a", "A", None).await.unwrap();
    let b = store.create_or_update("b", "B", None).await.unwrap();
    let c = store.create_or_update("c", "C", None).await.unwrap();

    assert_eq!(store.delete(&[a.id, b.id]).await.unwrap(), 2);
    let remaining = store.list(true).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, c.id);

    assert_eq!(store.delete(&[a.id]).await.unwrap(), 0);
    assert_eq!(store.delete(&[12345]).await.unwrap(), 0);
    assert_eq!(store.delete(&[]).await.unwrap(), 0);
    assert_eq!(store.list(true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_by_name() {
    let store = setup_store().await;
    store.create_or_update("welcome", "Hello", None).await.unwrap();
    store.delete_by_name("welcome").await.unwrap();
    assert!(matches!(
        store.get("welcome").await,
        Err(TemplateError::NotFound(name)) if name == "welcome"
    ));
    assert!(matches!(
        store.delete_by_name("welcome").await,
        Err(TemplateError::NotFound(name)) if name == "welcome"
    ));
}

#[tokio::test]
async fn missing_templates_report_identifier() {
    let store = setup_store().await;
    match store.get("absent-name").await {
        Err(TemplateError::NotFound(name)) => assert_eq!(name, "absent-name"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    match store.get_by_id(77).await {
        Err(TemplateError::NotFound(id)) => assert_eq!(id, "77"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn versioned_update_detects_conflicts() {
    let store = setup_store().await;
    store.create_or_update("promo", "v1", None).await.unwrap();

    let v2 = store.update_versioned("promo", 1, "v2", None).await.unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(v2.text, "v2");

    match store.update_versioned("promo", 1, "stale", None).await {
        Err(TemplateError::VersionConflict {
            name,
            expected,
            actual,
        }) => {
            assert_eq!(name, "promo");
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected VersionConflict, got {other:?}"),
    }
    let current = store.get("promo").await.unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.text, "v2");

    assert!(matches!(
        store.update_versioned("nope", 1, "x", None).await,
        Err(TemplateError::NotFound(_))
    ));
}

#[tokio::test]
async fn invalid_names_are_rejected() {
    let store = setup_store().await;
    assert!(matches!(
        store.create_or_update("", "x", None).await,
        Err(TemplateError::Invalid(_))
    ));
    assert!(matches!(
        store.create_or_update(&"n".repeat(101), "x", None).await,
        Err(TemplateError::Invalid(_))
    ));
    assert!(store.list(true).await.unwrap().is_empty());
}
