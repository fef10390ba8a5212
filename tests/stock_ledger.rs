//! Stock ledger and asset registry working together on the in-memory backend.

mod common;

use serde_json::json;
use stockroom::model::{Asset, AssetKey, TransactionType};
use stockroom::registry::{AssetPatch, EDIT_REMARK};
use stockroom::{App, MemoryStore, StockError};

fn app_with_asset() -> (std::sync::Arc<MemoryStore>, App, Asset) {
    let (store, app) = common::memory_app();
    let entry = stockroom::intake::IntakeEntry::from_json(&json!({
        "product_code": "SK",
        "name": "Scanner",
        "price": "1200"
    }))
    .unwrap();
    let outcome = app
        .intake
        .run(stockroom::intake::IntakeSource::Json, vec![entry])
        .unwrap();
    let asset = outcome.assets()[0].clone();
    (store, app, asset)
}

#[test]
fn hand_out_and_return() {
    let (_store, app, asset) = app_with_asset();

    let (out, entry) = app
        .ledger
        .transact(&asset.tag, "OUT", Some("B300"), Some("field trip"))
        .unwrap();
    assert_eq!(out.holder.as_ref().unwrap().name, "Kai Wu");
    assert_eq!(entry.asset_id, asset.id);

    let (back, _) = app.ledger.transact(&asset.tag, "IN", None, None).unwrap();
    assert!(back.in_warehouse());

    let history = app.ledger.history(&asset.tag).unwrap();
    let kinds: Vec<TransactionType> = history.iter().map(|e| e.transaction_type).collect();
    assert_eq!(kinds, [TransactionType::In, TransactionType::Out]);
    assert_eq!(history[1].remark.as_deref(), Some("field trip"));
}

#[test]
fn rejected_transitions_leave_no_trace() {
    let (store, app, asset) = app_with_asset();

    let err = app.ledger.transact(&asset.tag, "IN", None, None).unwrap_err();
    assert_eq!(err.to_string(), "already in warehouse");
    assert_eq!(err.status_code(), 409);

    let err = app.ledger.transact(&asset.tag, "OUT", None, None).unwrap_err();
    assert_eq!(err.to_string(), "missing person id");
    assert_eq!(err.status_code(), 400);

    let err = app
        .ledger
        .transact(&asset.tag, "OUT", Some("Z999"), None)
        .unwrap_err();
    assert_eq!(err.to_string(), "person does not exist");
    assert_eq!(err.status_code(), 404);

    let err = app
        .ledger
        .transact(&asset.tag, "TRANSFER", Some("A100"), None)
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid transaction type");

    let err = app.ledger.transact("NOPE-001", "IN", None, None).unwrap_err();
    assert!(matches!(err, StockError::NotFound(_)));

    assert_eq!(store.ledger_len().unwrap(), 0);
    assert!(app.registry.get(&AssetKey::Id(asset.id)).unwrap().in_warehouse());
}

#[test]
fn second_checkout_is_a_conflict() {
    let (store, app, asset) = app_with_asset();
    app.ledger
        .transact(&asset.tag, "OUT", Some("A100"), None)
        .unwrap();

    let err = app
        .ledger
        .transact(&asset.tag, "OUT", Some("A200"), None)
        .unwrap_err();
    assert_eq!(err.to_string(), "already checked out");

    let holder = app.registry.get(&AssetKey::parse(&asset.tag)).unwrap().holder;
    assert_eq!(holder.unwrap().id_number, "A100");
    assert_eq!(store.ledger_len().unwrap(), 1);
}

#[test]
fn holder_edit_goes_through_the_ledger() {
    let (_store, app, asset) = app_with_asset();

    let patch = AssetPatch::from_json(&json!({"holder_id": "A100"})).unwrap();
    let updated = app.registry.update(asset.id, &patch, &app.ledger).unwrap();
    assert_eq!(updated.holder.unwrap().id_number, "A100");

    // Reassigning returns the asset first, then hands it out again.
    let patch = AssetPatch::from_json(&json!({"holder_id": "B300"})).unwrap();
    let updated = app.registry.update(asset.id, &patch, &app.ledger).unwrap();
    assert_eq!(updated.holder.unwrap().id_number, "B300");

    let patch = AssetPatch::from_json(&json!({"holder_id": null})).unwrap();
    assert!(app
        .registry
        .update(asset.id, &patch, &app.ledger)
        .unwrap()
        .in_warehouse());

    let history = app.ledger.history(&asset.tag).unwrap();
    assert_eq!(history.len(), 4);
    assert!(history
        .iter()
        .all(|e| e.remark.as_deref() == Some(EDIT_REMARK)));
    assert_eq!(history[0].transaction_type, TransactionType::In);
}

#[test]
fn holder_edit_to_unknown_person_keeps_current_holder() {
    let (store, app, asset) = app_with_asset();
    app.ledger
        .transact(&asset.tag, "OUT", Some("A100"), None)
        .unwrap();

    let patch = AssetPatch::from_json(&json!({"holder_id": "GHOST"})).unwrap();
    let err = app.registry.update(asset.id, &patch, &app.ledger).unwrap_err();
    assert!(matches!(err, StockError::NotFound(_)));
    assert_eq!(err.to_string(), "person does not exist");

    let holder = app.registry.get(&AssetKey::Id(asset.id)).unwrap().holder;
    assert_eq!(holder.unwrap().id_number, "A100");
    assert_eq!(store.ledger_len().unwrap(), 1);
}

#[test]
fn concurrent_checkouts_admit_exactly_one() {
    let (store, app, asset) = app_with_asset();
    let people = ["A100", "A200", "B300", "A100", "A200", "B300", "A100", "A200"];

    let results: Vec<Result<_, StockError>> = std::thread::scope(|s| {
        let handles: Vec<_> = people
            .iter()
            .map(|id| {
                let (app, tag) = (&app, &asset.tag);
                s.spawn(move || app.ledger.transact(tag, "OUT", Some(*id), None))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.to_string(), "already checked out");
    }
    assert_eq!(store.ledger_len().unwrap(), 1);
}

#[test]
fn concurrent_creates_mint_contiguous_tags() {
    let (_store, app, first) = app_with_asset();
    let product = first.product.clone();

    let mut tags: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let (app, product) = (&app, &product);
                s.spawn(move || app.registry.create(product, None).unwrap().tag)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    tags.push(first.tag.clone());
    tags.sort();

    let expected: Vec<String> = (1..=13).map(|n| format!("SK-{n:03}")).collect();
    assert_eq!(tags, expected);
}

#[test]
fn unchanged_holder_writes_nothing() {
    let (store, app, asset) = app_with_asset();
    let patch = AssetPatch::from_json(&json!({"holder_id": null, "note": "ignored"})).unwrap();
    app.registry.update(asset.id, &patch, &app.ledger).unwrap();
    assert_eq!(store.ledger_len().unwrap(), 0);

    assert!(AssetPatch::from_json(&json!({"asset_tag": "SK-999"})).is_err());
}

#[test]
fn delete_cascades_ledger_entries() {
    let (store, app, asset) = app_with_asset();
    app.ledger
        .transact(&asset.tag, "OUT", Some("A100"), None)
        .unwrap();
    app.ledger.transact(&asset.tag, "IN", None, None).unwrap();
    assert_eq!(store.ledger_len().unwrap(), 2);

    app.registry.delete(asset.id).unwrap();
    assert_eq!(store.ledger_len().unwrap(), 0);
    assert!(matches!(
        app.ledger.history(&asset.tag),
        Err(StockError::NotFound(_))
    ));
    assert!(matches!(
        app.registry.delete(asset.id),
        Err(StockError::NotFound(_))
    ));
}

#[test]
fn tags_are_not_reused_after_delete() {
    let (_store, app, first) = app_with_asset();
    let product = first.product.clone();
    let second = app.registry.create(&product, None).unwrap();
    assert_eq!(second.tag, "SK-002");

    app.registry.delete(first.id).unwrap();
    let third = app.registry.create(&product, None).unwrap();
    assert_eq!(third.tag, "SK-003");
}
