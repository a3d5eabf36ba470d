use leadboard_core::{
    FaultKind, InMemoryLeadStore, Lead, LeadAttributes, LeadFilter, LeadStore, Priority,
    ScriptedFaults, SqliteLeadStore, Stage, StoreError, StoreErrorKind, StoreOp,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn lead(name: &str, stage: Stage, tags: &[&str], priority: Priority) -> Lead {
    let mut attributes = LeadAttributes::new(name);
    attributes.company = Some(format!("{name} Inc"));
    attributes.email = Some(format!("{}@example.com", name.to_lowercase()));
    attributes.amount_cents = 10_000;
    attributes.tags = tags.iter().map(|tag| tag.to_string()).collect();
    attributes.priority = priority;
    Lead::new(stage, attributes)
}

fn fixture() -> Vec<Lead> {
    vec![
        lead("Alpha", Stage::Incoming, &["a"], Priority::High),
        lead("Bravo", Stage::Decision, &["b"], Priority::Low),
        lead("Charlie", Stage::Negotiation, &["a", "b"], Priority::Urgent),
        lead("Delta", Stage::Final, &[], Priority::Medium),
    ]
}

fn names(leads: &[Lead]) -> Vec<&str> {
    leads
        .iter()
        .map(|lead| lead.attributes.name.as_str())
        .collect()
}

fn sqlite_store_with(leads: &[Lead]) -> SqliteLeadStore {
    let store = SqliteLeadStore::open_in_memory().unwrap();
    for lead in leads {
        store.insert(lead).unwrap();
    }
    store
}

fn sqlite_fixture() -> SqliteLeadStore {
    sqlite_store_with(&fixture())
}

#[tokio::test]
async fn sqlite_list_returns_insertion_order_with_tags() {
    let store = sqlite_fixture();

    let leads = store.list(&LeadFilter::all()).await.unwrap();
    assert_eq!(names(&leads), vec!["Alpha", "Bravo", "Charlie", "Delta"]);
    assert_eq!(leads[2].attributes.tags, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(leads[2].attributes.priority, Priority::Urgent);
    assert_eq!(leads[0].attributes.amount_cents, 10_000);
}

#[tokio::test]
async fn sqlite_tag_filter_matches_any_requested_tag() {
    let store = sqlite_fixture();

    let tagged_a = store.list(&LeadFilter::all().with_tag("A")).await.unwrap();
    assert_eq!(names(&tagged_a), vec!["Alpha", "Charlie"]);

    let tagged_a_or_b = store
        .list(&LeadFilter::all().with_tag("a").with_tag("b"))
        .await
        .unwrap();
    assert_eq!(names(&tagged_a_or_b), vec!["Alpha", "Bravo", "Charlie"]);
}

#[tokio::test]
async fn sqlite_filters_combine_across_dimensions() {
    let store = sqlite_fixture();

    let stages = store
        .list(
            &LeadFilter::all()
                .with_stage(Stage::Incoming)
                .with_stage(Stage::Decision),
        )
        .await
        .unwrap();
    assert_eq!(names(&stages), vec!["Alpha", "Bravo"]);

    let combined = store
        .list(
            &LeadFilter::all()
                .with_tag("a")
                .with_priority(Priority::Urgent)
                .with_search("CHAR"),
        )
        .await
        .unwrap();
    assert_eq!(names(&combined), vec!["Charlie"]);

    let by_email = store
        .list(&LeadFilter::all().with_search("delta@"))
        .await
        .unwrap();
    assert_eq!(names(&by_email), vec!["Delta"]);
}

#[tokio::test]
async fn sqlite_update_stage_persists_one_field() {
    let store = sqlite_fixture();
    let alpha = store.list(&LeadFilter::all()).await.unwrap().remove(0);

    let updated = store.update_stage(alpha.id, Stage::Final).await.unwrap();
    assert_eq!(updated.stage, Stage::Final);
    assert_eq!(updated.attributes, alpha.attributes);

    let reloaded = store.get(alpha.id).unwrap().unwrap();
    assert_eq!(reloaded.stage, Stage::Final);
}

#[tokio::test]
async fn sqlite_update_stage_unknown_lead_is_not_found() {
    let store = sqlite_fixture();
    let missing = Uuid::new_v4();

    let err = store.update_stage(missing, Stage::Decision).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
    assert_eq!(err.kind(), StoreErrorKind::NotFound);
}

#[test]
fn sqlite_insert_rejects_invalid_and_duplicate_leads() {
    let store = SqliteLeadStore::open_in_memory().unwrap();
    let invalid = lead("  ", Stage::Incoming, &[], Priority::Low);
    assert!(matches!(
        store.insert(&invalid),
        Err(StoreError::Validation(_))
    ));

    let valid = lead("Echo", Stage::Incoming, &[], Priority::Low);
    store.insert(&valid).unwrap();
    let err = store.insert(&valid).unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::Storage);
}

#[tokio::test]
async fn sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leads.sqlite3");
    let foxtrot = lead("Foxtrot", Stage::Negotiation, &["vip"], Priority::High);

    {
        let store = SqliteLeadStore::open(&path).unwrap();
        store.insert(&foxtrot).unwrap();
        store.update_stage(foxtrot.id, Stage::Final).await.unwrap();
    }

    let store = SqliteLeadStore::open(&path).unwrap();
    let leads = store.list(&LeadFilter::all()).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].stage, Stage::Final);
    assert_eq!(leads[0].attributes.tags, vec!["vip".to_string()]);
}

#[tokio::test]
async fn memory_store_filters_like_sqlite_store() {
    let mut leads = fixture();
    let mut raw = LeadAttributes::new("Echo");
    raw.tags = vec!["VIP".to_string(), " vip ".to_string(), "B".to_string()];
    leads.push(Lead {
        id: Uuid::new_v4(),
        stage: Stage::Incoming,
        attributes: raw,
    });
    let memory = InMemoryLeadStore::with_leads(leads.clone()).unwrap();
    let sqlite = sqlite_store_with(&leads);
    let filters = [
        LeadFilter::all(),
        LeadFilter::all().with_tag("b"),
        LeadFilter::all().with_priority(Priority::High).with_priority(Priority::Low),
        LeadFilter::all().with_stage(Stage::Final),
        LeadFilter::all().with_search("inc").with_tag("a"),
        LeadFilter::all().with_tag("vip"),
        LeadFilter::all().with_tag(" VIP "),
    ];

    for filter in &filters {
        let from_memory = memory.list(filter).await.unwrap();
        let from_sqlite = sqlite.list(filter).await.unwrap();
        assert_eq!(from_memory, from_sqlite, "filter {filter:?}");
    }

    let vip = sqlite.list(&LeadFilter::all().with_tag("vip")).await.unwrap();
    assert_eq!(names(&vip), vec!["Echo"]);
    assert_eq!(vip[0].attributes.tags, vec!["b", "vip"]);
}

#[test]
fn sqlite_insert_stores_normalized_tags() {
    let store = SqliteLeadStore::open_in_memory().unwrap();
    let mut attributes = LeadAttributes::new("Foxtrot");
    attributes.tags = vec!["Key Account".to_string(), "key account ".to_string()];
    let lead = Lead {
        id: Uuid::new_v4(),
        stage: Stage::Decision,
        attributes,
    };

    store.insert(&lead).unwrap();

    let stored = store.get(lead.id).unwrap().unwrap();
    assert_eq!(stored.attributes.tags, vec!["key account"]);
}

#[tokio::test]
async fn memory_store_counts_calls_and_injects_faults() {
    let faults = Arc::new(ScriptedFaults::new());
    let store = InMemoryLeadStore::with_leads(fixture())
        .unwrap()
        .with_faults(faults.clone());
    let alpha_id = store.list(&LeadFilter::all()).await.unwrap()[0].id;

    faults.fail_next(StoreOp::List, FaultKind::Transient);
    let err = store.list(&LeadFilter::all()).await.unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::Transient);

    faults.fail_next(StoreOp::UpdateStage, FaultKind::NotFound);
    let err = store.update_stage(alpha_id, Stage::Decision).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == alpha_id));
    assert_eq!(store.get(alpha_id).unwrap().stage, Stage::Incoming);

    let updated = store.update_stage(alpha_id, Stage::Decision).await.unwrap();
    assert_eq!(updated.stage, Stage::Decision);

    assert_eq!(store.list_calls(), 2);
    assert_eq!(store.update_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn memory_store_applies_configured_latency() {
    let store = InMemoryLeadStore::with_leads(fixture())
        .unwrap()
        .with_latency(Duration::from_millis(300));

    let started = tokio::time::Instant::now();
    store.list(&LeadFilter::all()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn memory_store_reports_removed_lead_as_not_found() {
    let store = InMemoryLeadStore::with_leads(fixture()).unwrap();
    let bravo = store.list(&LeadFilter::all()).await.unwrap()[1].clone();

    store.remove(bravo.id).unwrap();
    assert_eq!(store.len(), 3);
    let err = store.update_stage(bravo.id, Stage::Final).await.unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::NotFound);
}
