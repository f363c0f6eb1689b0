//! Integration tests for confirmation delivery after booking.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use booking_store::{
    BookingStoreExt, InMemoryBookingStore, Money, ReservationStatus, StallSize, StallStatus,
};
use common::IdentityContext;
use domain::{
    AllocationEngine, CreateStall, InMemoryUserDirectory, StallCatalog, UserProfile,
};
use notifications::{
    ConfirmationMessage, NotificationDispatcher, NotificationError, Notifier, RecordingNotifier,
    RetryPolicy,
};
use tokio::sync::Semaphore;

fn directory() -> Arc<InMemoryUserDirectory> {
    Arc::new(
        [
            UserProfile::new("alice", "alice@example.com", "Alice").with_business_name("Alice Books"),
            UserProfile::new("bob", "bob@example.com", "Bob"),
        ]
        .into_iter()
        .collect(),
    )
}

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(1))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

async fn booked_engine(
    dispatcher: NotificationDispatcher,
) -> (
    InMemoryBookingStore,
    AllocationEngine<InMemoryBookingStore, NotificationDispatcher>,
    booking_store::Stall,
) {
    let store = InMemoryBookingStore::new();
    let stall = StallCatalog::new(store.clone())
        .create_stall(
            &IdentityContext::admin("organizer"),
            CreateStall::new(
                "A1",
                StallSize::Large,
                Money::from_minor(1_500_000),
                "Ground Floor",
                "10x10 feet",
            ),
        )
        .await
        .unwrap();
    let engine = AllocationEngine::with_sink(store.clone(), dispatcher);
    (store, engine, stall)
}

#[tokio::test]
async fn confirmed_reservation_is_delivered_in_background() {
    let notifier = RecordingNotifier::new();
    let (dispatcher, _worker) = NotificationDispatcher::spawn(
        directory(),
        Arc::new(notifier.clone()),
        fast_retry(3),
        16,
    );
    let (_store, engine, stall) = booked_engine(dispatcher).await;

    let details = engine
        .reserve(
            &IdentityContext::user("alice"),
            stall.id,
            Money::from_minor(1_500_000),
        )
        .await
        .unwrap();

    wait_until(|| notifier.sent_count() == 1).await;
    let sent = notifier.sent();
    assert_eq!(sent[0].reservation_id, details.reservation.id);
    assert_eq!(sent[0].recipient_email, "alice@example.com");
    assert_eq!(sent[0].subject(), "Bookfair Reservation Confirmed - A1");
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let notifier = RecordingNotifier::new();
    notifier.fail_next(2);
    let (dispatcher, _worker) = NotificationDispatcher::spawn(
        directory(),
        Arc::new(notifier.clone()),
        fast_retry(3),
        16,
    );
    let (_store, engine, stall) = booked_engine(dispatcher).await;

    engine
        .reserve(&IdentityContext::user("bob"), stall.id, Money::zero())
        .await
        .unwrap();

    wait_until(|| notifier.sent_count() == 1).await;
    assert_eq!(notifier.attempts(), 3);
}

#[tokio::test]
async fn delivery_failure_does_not_undo_booking() {
    let notifier = RecordingNotifier::new();
    notifier.set_fail_on_send(true);
    let (dispatcher, _worker) = NotificationDispatcher::spawn(
        directory(),
        Arc::new(notifier.clone()),
        fast_retry(2),
        16,
    );
    let (store, engine, stall) = booked_engine(dispatcher).await;

    let details = engine
        .reserve(&IdentityContext::user("alice"), stall.id, Money::zero())
        .await
        .unwrap();
    assert_eq!(details.reservation.status, ReservationStatus::Confirmed);

    wait_until(|| notifier.attempts() == 2).await;
    assert_eq!(notifier.sent_count(), 0);
    let stall = store.get_stall(stall.id).await.unwrap().unwrap();
    assert_eq!(stall.status, StallStatus::Reserved);
}

#[tokio::test]
async fn unknown_recipient_is_skipped() {
    let notifier = RecordingNotifier::new();
    let (dispatcher, _worker) = NotificationDispatcher::spawn(
        directory(),
        Arc::new(notifier.clone()),
        fast_retry(3),
        16,
    );
    let (_store, engine, stall) = booked_engine(dispatcher.clone()).await;

    let details = engine
        .reserve(&IdentityContext::user("stranger"), stall.id, Money::zero())
        .await
        .unwrap();

    let err = dispatcher.send_now(&details).await.unwrap_err();
    assert!(matches!(err, NotificationError::RecipientUnknown(_)));
    assert_eq!(notifier.attempts(), 0);
}

#[tokio::test]
async fn send_now_reports_exhausted_retries() {
    let notifier = RecordingNotifier::new();
    let (dispatcher, _worker) = NotificationDispatcher::spawn(
        directory(),
        Arc::new(notifier.clone()),
        fast_retry(2),
        16,
    );
    let (_store, engine, stall) = booked_engine(dispatcher.clone()).await;
    let details = engine
        .reserve(&IdentityContext::user("alice"), stall.id, Money::zero())
        .await
        .unwrap();
    wait_until(|| notifier.sent_count() == 1).await;

    notifier.set_fail_on_send(true);
    let err = dispatcher.send_now(&details).await.unwrap_err();
    assert!(matches!(
        err,
        NotificationError::RetriesExhausted { attempts: 2, .. }
    ));

    notifier.set_fail_on_send(false);
    let sent = dispatcher.send_now(&details).await.unwrap();
    assert_eq!(sent.recipient_email, "alice@example.com");
    assert_eq!(notifier.sent_count(), 2);
}

/// Notifier that blocks every send until a permit is released.
struct GatedNotifier {
    gate: Semaphore,
    entered: AtomicUsize,
}

#[async_trait]
impl Notifier for GatedNotifier {
    async fn send_confirmation(&self, _message: &ConfirmationMessage) -> notifications::Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

#[tokio::test]
async fn full_queue_drops_instead_of_blocking() {
    let gated = Arc::new(GatedNotifier {
        gate: Semaphore::new(0),
        entered: AtomicUsize::new(0),
    });
    let (dispatcher, _worker) =
        NotificationDispatcher::spawn(directory(), gated.clone(), RetryPolicy::no_retry(), 1);
    let (store, engine, first_stall) = booked_engine(dispatcher.clone()).await;
    let catalog = StallCatalog::new(store);
    let mut stalls = vec![first_stall];
    for code in ["A2", "A3"] {
        stalls.push(
            catalog
                .create_stall(
                    &IdentityContext::admin("organizer"),
                    CreateStall::new(code, StallSize::Small, Money::zero(), "Hall", "2x2"),
                )
                .await
                .unwrap(),
        );
    }
    let alice = IdentityContext::user("alice");

    // The worker picks up the first confirmation and blocks on the gate.
    engine.reserve(&alice, stalls[0].id, Money::zero()).await.unwrap();
    wait_until(|| gated.entered.load(Ordering::SeqCst) == 1).await;

    // The second fills the queue; the third is dropped, yet both bookings succeed.
    engine.reserve(&alice, stalls[1].id, Money::zero()).await.unwrap();
    let third = engine.reserve(&alice, stalls[2].id, Money::zero()).await.unwrap();
    assert_eq!(third.stall.status, StallStatus::Reserved);
    assert!(matches!(
        dispatcher.enqueue(third),
        Err(NotificationError::QueueFull)
    ));

    gated.gate.add_permits(3);
    wait_until(|| gated.entered.load(Ordering::SeqCst) == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gated.entered.load(Ordering::SeqCst), 2);
}
