//! Behavioural tests for the in-memory `FiscalStore`.

use chrono::{NaiveDate, Utc};
use secrecy::{ExposeSecret, Secret};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use fotara_core::{
    Amount, Buyer, DocumentKind, DocumentStatus, FiscalDocument, LineItem, PaymentTerms,
    SubmissionLogEntry, TaxCategory, TenantFiscalConfig,
};
use fotara_db::{
    AllocationRequest, AttemptOutcome, DbError, FiscalStore, MemoryStore, TenantCredentials,
    TenantUpsert,
};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

fn upsert(tenant_ref: &str, starter: i64) -> TenantUpsert {
    let mut config = TenantFiscalConfig::new(tenant_ref, "ACME", "Acme Trading");
    config.enabled = true;
    TenantUpsert {
        config,
        credentials: Some(TenantCredentials {
            client_id: "client".into(),
            secret_key: Secret::new("secret".into()),
        }),
        starter_counter: starter,
    }
}

fn document(tenant_ref: &str, document_ref: &str) -> FiscalDocument {
    FiscalDocument {
        document_ref: document_ref.into(),
        tenant_ref: tenant_ref.into(),
        kind: DocumentKind::Invoice,
        finalized: true,
        is_pos: true,
        payment_terms: PaymentTerms::Cash,
        buyer: Buyer::default(),
        lines: vec![LineItem {
            name: "Tea".into(),
            quantity: Amount::from_int(1),
            unit_price: Amount::from_int(1),
            uom: "Nos".into(),
            tax_rate: Amount::ZERO,
            tax_category: Some(TaxCategory::ZeroExempt),
            discount: Amount::ZERO,
        }],
        discount: Amount::ZERO,
        reversal_of: None,
        identity: None,
        status: DocumentStatus::Pending,
        qr_artifact: None,
        last_error_kind: None,
        last_error_retryable: false,
        attempts: 0,
    }
}

fn request(tenant_ref: &str, document_ref: &str) -> AllocationRequest {
    AllocationRequest {
        tenant_ref: tenant_ref.into(),
        document_ref: document_ref.into(),
        today: day(),
        uuid: Uuid::new_v4(),
        lock_wait: Duration::from_secs(5),
    }
}

async fn seeded(docs: usize) -> MemoryStore {
    let store = MemoryStore::new();
    store.upsert_tenant(&upsert("t1", 0)).await.unwrap();
    for i in 0..docs {
        store
            .upsert_document(&document("t1", &format!("SINV-{:04}", i)))
            .await
            .unwrap();
    }
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocation_is_gapless_and_unique() {
    let store = Arc::new(seeded(50).await);

    let mut handles = Vec::new();
    for i in 0..50 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .allocate_identity(&request("t1", &format!("SINV-{:04}", i)))
                .await
                .unwrap()
        }));
    }

    let mut counters = Vec::new();
    let mut daily_ids = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.fresh);
        counters.push(outcome.identity.audit_counter);
        daily_ids.insert(outcome.identity.daily_id);
    }

    counters.sort();
    assert_eq!(counters, (1..=50).collect::<Vec<i64>>());
    assert_eq!(daily_ids.len(), 50);

    let tenant = store.get_tenant("t1").await.unwrap().unwrap();
    assert_eq!(tenant.counters.latest_issued_counter, 50);
    assert_eq!(tenant.counters.last_daily_seq_number, 50);
}

#[tokio::test]
async fn test_second_allocation_returns_same_identity() {
    let store = seeded(1).await;

    let first = store.allocate_identity(&request("t1", "SINV-0000")).await.unwrap();
    let second = store.allocate_identity(&request("t1", "SINV-0000")).await.unwrap();

    assert!(first.fresh);
    assert!(!second.fresh);
    assert_eq!(first.identity, second.identity);

    let tenant = store.get_tenant("t1").await.unwrap().unwrap();
    assert_eq!(tenant.counters.latest_issued_counter, 1);
}

#[tokio::test]
async fn test_lock_timeout_writes_nothing() {
    let store = seeded(1).await;
    let guard = store.hold_tenant_lock("t1").await;

    let mut req = request("t1", "SINV-0000");
    req.lock_wait = Duration::from_millis(50);
    let err = store.allocate_identity(&req).await.unwrap_err();
    assert!(matches!(err, DbError::LockTimeout { .. }));

    let doc = store.get_document("SINV-0000").await.unwrap().unwrap();
    assert!(doc.identity.is_none());
    assert_eq!(doc.status, DocumentStatus::Pending);

    drop(guard);
    let outcome = store.allocate_identity(&req).await.unwrap();
    assert_eq!(outcome.identity.audit_counter, 1);
}

#[tokio::test]
async fn test_tenants_do_not_share_counters() {
    let store = seeded(1).await;
    store.upsert_tenant(&upsert("t2", 500)).await.unwrap();
    store.upsert_document(&document("t2", "OTHER-1")).await.unwrap();

    let a = store.allocate_identity(&request("t1", "SINV-0000")).await.unwrap();
    let b = store.allocate_identity(&request("t2", "OTHER-1")).await.unwrap();
    assert_eq!(a.identity.audit_counter, 1);
    assert_eq!(b.identity.audit_counter, 501);
}

#[tokio::test]
async fn test_identified_document_content_is_frozen() {
    let store = seeded(1).await;

    // Replaceable before identity
    let mut doc = document("t1", "SINV-0000");
    doc.discount = Amount::from_int(1);
    let saved = store.upsert_document(&doc).await.unwrap();
    assert_eq!(saved.discount, Amount::from_int(1));

    store.allocate_identity(&request("t1", "SINV-0000")).await.unwrap();

    doc.discount = Amount::from_int(2);
    let err = store.upsert_document(&doc).await.unwrap_err();
    assert!(matches!(err, DbError::Immutable { .. }));
}

#[tokio::test]
async fn test_upsert_ignores_pipeline_fields() {
    let store = seeded(0).await;
    let mut doc = document("t1", "SINV-0001");
    doc.status = DocumentStatus::Success;
    doc.attempts = 7;

    let saved = store.upsert_document(&doc).await.unwrap();
    assert_eq!(saved.status, DocumentStatus::Pending);
    assert_eq!(saved.attempts, 0);
}

#[tokio::test]
async fn test_document_requires_known_tenant() {
    let store = MemoryStore::new();
    let err = store
        .upsert_document(&document("ghost", "SINV-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
}

#[tokio::test]
async fn test_record_outcome_never_leaves_success() {
    let store = seeded(1).await;
    store.allocate_identity(&request("t1", "SINV-0000")).await.unwrap();

    let doc = store
        .record_outcome("SINV-0000", &AttemptOutcome::success("QR".into(), Utc::now()))
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Success);
    assert_eq!(doc.attempts, 1);

    let doc = store
        .record_outcome(
            "SINV-0000",
            &AttemptOutcome::failure("transport_failure", true, Utc::now()),
        )
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Success);
    assert_eq!(doc.qr_artifact.as_deref(), Some("QR"));
    assert_eq!(doc.attempts, 1);
}

#[tokio::test]
async fn test_record_outcome_requires_identity() {
    let store = seeded(1).await;
    let err = store
        .record_outcome(
            "SINV-0000",
            &AttemptOutcome::failure("transport_failure", true, Utc::now()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Immutable { .. }));
}

#[tokio::test]
async fn test_list_redrivable_filters_and_orders() {
    let store = seeded(3).await;
    for i in 0..3 {
        store
            .allocate_identity(&request("t1", &format!("SINV-{:04}", i)))
            .await
            .unwrap();
    }

    let earlier = Utc::now() - chrono::Duration::minutes(10);
    let later = Utc::now();
    store
        .record_outcome("SINV-0000", &AttemptOutcome::failure("transport_failure", true, later))
        .await
        .unwrap();
    store
        .record_outcome("SINV-0001", &AttemptOutcome::failure("endpoint_rejected", false, later))
        .await
        .unwrap();
    store
        .record_outcome("SINV-0002", &AttemptOutcome::failure("transport_timeout", true, earlier))
        .await
        .unwrap();

    let candidates = store.list_redrivable(10, 10).await.unwrap();
    let refs: Vec<_> = candidates.iter().map(|c| c.document_ref.as_str()).collect();
    assert_eq!(refs, vec!["SINV-0002", "SINV-0000"]);

    assert!(store.list_redrivable(1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_redrivable_skips_disabled_tenants() {
    let store = seeded(1).await;
    store.allocate_identity(&request("t1", "SINV-0000")).await.unwrap();
    store
        .record_outcome(
            "SINV-0000",
            &AttemptOutcome::failure("transport_failure", true, Utc::now()),
        )
        .await
        .unwrap();
    assert_eq!(store.list_redrivable(10, 10).await.unwrap().len(), 1);

    let mut disabled = upsert("t1", 0);
    disabled.config.enabled = false;
    store.upsert_tenant(&disabled).await.unwrap();
    assert!(store.list_redrivable(10, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_logs_are_listed_per_document() {
    let store = seeded(2).await;
    for doc in ["SINV-0000", "SINV-0001", "SINV-0000"] {
        store
            .append_log(&SubmissionLogEntry {
                id: Uuid::new_v4(),
                document_ref: doc.into(),
                tenant_ref: "t1".into(),
                status: DocumentStatus::Error,
                raw_payload: String::new(),
                response_body: "{}".into(),
                error_detail: Some("boom".into()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    assert_eq!(store.list_logs("SINV-0000").await.unwrap().len(), 2);
    assert_eq!(store.log_count().await, 3);

    store.set_reject_log_appends(true);
    let entry = store.list_logs("SINV-0001").await.unwrap().remove(0);
    assert!(store.append_log(&entry).await.is_err());
}

#[tokio::test]
async fn test_tenant_upsert_keeps_counters_and_credentials() {
    let store = seeded(1).await;
    store.allocate_identity(&request("t1", "SINV-0000")).await.unwrap();

    let mut update = upsert("t1", 0);
    update.credentials = None;
    update.config.enabled = false;
    let record = store.upsert_tenant(&update).await.unwrap();

    assert!(!record.config.enabled);
    assert_eq!(record.counters.latest_issued_counter, 1);
    let creds = record.credentials.unwrap();
    assert_eq!(creds.secret_key.expose_secret(), "secret");
}
