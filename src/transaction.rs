use std::{
    mem,
    sync::{Mutex, PoisonError},
};

use crate::handles::TrHandle;

/// Callback invoked when the transaction ends. Must not call back into the transaction it is
/// subscribed to; by the time it runs the subscription is already gone.
type Observer = Box<dyn FnMut() + Send>;

/// Revocation handle of one end-of-transaction subscription. Returned by
/// [`Transaction::subscribe`], consumed by [`Transaction::unsubscribe`].
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription(u64);

/// An active transaction as seen by the statements running under it.
///
/// The transaction is independently lived: it can be committed or rolled back while statements
/// still reference it. Statements therefore subscribe to its end-of-life notification, so an
/// externally terminated transaction forces them into a closed state without any caller noticing
/// it first. Subscribe and unsubscribe are symmetric; a statement rebinding to a different
/// transaction revokes its old subscription and never leaves one dangling.
pub struct Transaction {
    handle: TrHandle,
    observers: Mutex<ObserverRegistry>,
}

#[derive(Default)]
struct ObserverRegistry {
    next_id: u64,
    entries: Vec<(u64, Observer)>,
}

impl Transaction {
    pub fn new(handle: TrHandle) -> Self {
        Transaction {
            handle,
            observers: Mutex::new(ObserverRegistry::default()),
        }
    }

    pub fn handle(&self) -> TrHandle {
        self.handle
    }

    /// Register an observer for the end of this transaction. The observer fires at most once.
    pub fn subscribe(&self, observer: Observer) -> Subscription {
        let mut registry = self.lock_observers();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, observer));
        Subscription(id)
    }

    /// Revoke a subscription. A no-op if the observer already fired or was drained by
    /// [`Self::notify_ended`].
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut registry = self.lock_observers();
        registry.entries.retain(|(id, _)| *id != subscription.0);
    }

    /// Signal that this transaction has ended (committed, rolled back, or otherwise terminated).
    ///
    /// Drains the registry first and invokes the observers outside the lock, so an observer
    /// locking its own statement can never deadlock against a concurrent subscribe on this
    /// transaction.
    pub fn notify_ended(&self) {
        let drained = {
            let mut registry = self.lock_observers();
            mem::take(&mut registry.entries)
        };
        for (_, mut observer) in drained {
            observer();
        }
    }

    /// Number of live subscriptions. Observable state for callers coordinating shutdown.
    pub fn observer_count(&self) -> usize {
        self.lock_observers().entries.len()
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, ObserverRegistry> {
        // A panicking observer must not wedge every other statement on this transaction.
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    fn counting_observer() -> (Arc<AtomicUsize>, Observer) {
        let fired = Arc::new(AtomicUsize::new(0));
        let observer = {
            let fired = fired.clone();
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        (fired, observer)
    }

    #[test]
    fn observers_fire_exactly_once() {
        let transaction = Transaction::new(TrHandle(7));
        let (fired, observer) = counting_observer();
        transaction.subscribe(observer);

        transaction.notify_ended();
        transaction.notify_ended();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(transaction.observer_count(), 0);
    }

    #[test]
    fn unsubscribed_observers_do_not_fire() {
        let transaction = Transaction::new(TrHandle(7));
        let (fired, observer) = counting_observer();
        let subscription = transaction.subscribe(observer);
        transaction.unsubscribe(subscription);

        transaction.notify_ended();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_only_removes_the_given_subscription() {
        let transaction = Transaction::new(TrHandle(7));
        let (first_fired, first) = counting_observer();
        let (second_fired, second) = counting_observer();
        let first_subscription = transaction.subscribe(first);
        transaction.subscribe(second);

        transaction.unsubscribe(first_subscription);
        transaction.notify_ended();

        assert_eq!(first_fired.load(Ordering::SeqCst), 0);
        assert_eq!(second_fired.load(Ordering::SeqCst), 1);
    }
}
