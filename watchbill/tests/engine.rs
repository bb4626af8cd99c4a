//! End-to-end flows over the fully wired in-memory engine.

use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;
use watchbill::classify::Urgency;
use watchbill::db::models::slots::SlotStatus;
use watchbill::errors::ErrorCode;
use watchbill::services::CancelOptions;
use watchbill::test_utils::{far_future_date, slot_request, test_engine};

/// Lifecycle of one slot: fill it, overflow onto the waiting list, cancel
/// a seat, promote the queue head into it.
#[test_log::test(tokio::test)]
async fn slot_lifecycle_with_waiting_list() {
    let engine = test_engine();
    let location = Uuid::new_v4();
    let slot = engine
        .registry
        .create(slot_request(location, far_future_date(), "09:00:00", "12:00:00", 2), Uuid::new_v4())
        .await
        .unwrap();

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let carol = Uuid::new_v4();

    let outcome = engine.assignments.register(slot.id, alice, alice).await.unwrap();
    assert_eq!(outcome.slot.current_participants, 1);
    assert_eq!(outcome.slot.status, SlotStatus::Open);

    let outcome = engine.assignments.register(slot.id, bob, bob).await.unwrap();
    assert_eq!(outcome.slot.current_participants, 2);
    assert_eq!(outcome.slot.status, SlotStatus::Full);

    // Third seat request bounces; Carol queues instead.
    let err = engine.assignments.register(slot.id, carol, carol).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GuardFull);
    engine.waiting.join(slot.id, carol).await.unwrap();

    // Alice cancels a month out: no escalation, the seat frees up.
    let outcome = engine
        .assignments
        .cancel(slot.id, alice, alice, CancelOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.urgency, Urgency::Normal);
    assert_eq!(outcome.slot.current_participants, 1);
    assert_eq!(outcome.slot.status, SlotStatus::Open);

    let promoted = engine.waiting.promote(slot.id).await.unwrap();
    assert_eq!(promoted, vec![carol]);

    let slot_after = engine.registry.get(slot.id).await.unwrap();
    assert_eq!(slot_after.current_participants, 2);
    assert_eq!(slot_after.status, SlotStatus::Full);
    assert_eq!(engine.store.assignments_for_slot(slot.id).len(), 3);
}

/// Many callers race for a single seat; exactly one wins and the counter
/// never drifts from the number of confirmed assignments.
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_registrations_take_exactly_one_seat() {
    let engine = Arc::new(test_engine());
    let slot = engine
        .registry
        .create(slot_request(Uuid::new_v4(), far_future_date(), "09:00:00", "12:00:00", 1), Uuid::new_v4())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        let slot_id = slot.id;
        handles.push(tokio::spawn(async move {
            let participant = Uuid::new_v4();
            engine.assignments.register(slot_id, participant, participant).await
        }));
    }

    let mut wins = 0;
    let mut full = 0;
    for outcome in join_all(handles).await {
        match outcome.unwrap() {
            Ok(_) => wins += 1,
            Err(e) if e.code() == ErrorCode::GuardFull => full += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(full, 7);

    let slot_after = engine.registry.get(slot.id).await.unwrap();
    assert_eq!(slot_after.current_participants, 1);
    assert_eq!(slot_after.status, SlotStatus::Full);
    assert_eq!(
        engine.store.assignments_for_slot(slot.id).len(),
        slot_after.current_participants as usize
    );
}

/// Concurrent joiners all land on the waiting list with distinct,
/// strictly increasing ranks.
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_waiting_list_joins_keep_distinct_ranks() {
    let engine = Arc::new(test_engine());
    let slot = engine
        .registry
        .create(slot_request(Uuid::new_v4(), far_future_date(), "09:00:00", "12:00:00", 1), Uuid::new_v4())
        .await
        .unwrap();
    let seated = Uuid::new_v4();
    engine.assignments.register(slot.id, seated, seated).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let engine = Arc::clone(&engine);
        let slot_id = slot.id;
        handles.push(tokio::spawn(async move {
            engine.waiting.join(slot_id, Uuid::new_v4()).await
        }));
    }
    let mut ranks: Vec<i64> = join_all(handles)
        .await
        .into_iter()
        .map(|outcome| outcome.unwrap().unwrap().rank)
        .collect();
    ranks.sort_unstable();
    ranks.dedup();
    assert_eq!(ranks.len(), 6);
}

/// Cancelling a whole slot notifies every confirmed participant and
/// freezes the waiting list.
#[test_log::test(tokio::test)]
async fn cancelling_a_slot_clears_seats_and_queue() {
    let engine = test_engine();
    let slot = engine
        .registry
        .create(slot_request(Uuid::new_v4(), far_future_date(), "09:00:00", "12:00:00", 1), Uuid::new_v4())
        .await
        .unwrap();

    let seated = Uuid::new_v4();
    let waiting = Uuid::new_v4();
    engine.assignments.register(slot.id, seated, seated).await.unwrap();
    engine.waiting.join(slot.id, waiting).await.unwrap();

    engine
        .registry
        .cancel_slot(slot.id, "site closed for works", Uuid::new_v4())
        .await
        .unwrap();

    let slot_after = engine.registry.get(slot.id).await.unwrap();
    assert_eq!(slot_after.status, SlotStatus::Cancelled);
    assert_eq!(slot_after.current_participants, 0);

    // No promotion out of a cancelled slot, no late registrations into it.
    assert!(engine.waiting.promote(slot.id).await.unwrap().is_empty());
    let latecomer = Uuid::new_v4();
    let err = engine
        .assignments
        .register(slot.id, latecomer, latecomer)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GuardClosed);
}
