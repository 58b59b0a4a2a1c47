use tokio::sync::{broadcast, watch};

/**
 * How many unread transitions a transition receiver may fall behind before it lags.
 */
const TRANSITION_CAPACITY: usize = 64;

/// A value that one party writes and any number of parties observe.
///
/// Observers either get a `watch::Receiver`, which always holds the latest value and wakes up
/// only when the value actually changes, or a `broadcast::Receiver` that sees every single
/// change in the order it was made.
#[derive(Debug)]
pub struct StateCell<T> {
    sender: watch::Sender<T>,
    transitions: broadcast::Sender<T>,
}

impl<T: Clone + PartialEq> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        StateCell { sender, transitions }
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Stores `value`, returns true if it differed from the previous one.
    pub fn set(&self, value: T) -> bool {
        let transitions = &self.transitions;

        // runs under the watch lock, so transitions are broadcast in the order they are stored
        self.sender.send_if_modified(|current| {
            if *current == value {
                return false;
            }

            *current = value.clone();
            // no transition receivers is fine
            let _ = transitions.send(value);
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Every change made after this call.
    pub fn transitions(&self) -> broadcast::Receiver<T> {
        self.transitions.subscribe()
    }
}

impl<T: Clone + PartialEq + Default> Default for StateCell<T> {
    fn default() -> Self {
        StateCell::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_changes_only() {
        let cell = StateCell::new(false);
        assert!(!cell.set(false));
        assert!(cell.set(true));
        assert!(!cell.set(true));
        assert!(cell.get());
    }

    #[test]
    fn observers_see_latest_value() {
        let cell = StateCell::new(0u8);
        let mut rx = cell.subscribe();

        cell.set(1);
        cell.set(2);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 2);

        cell.set(2);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn transitions_keep_every_change() {
        let cell = StateCell::new(false);
        let mut transitions = cell.transitions();

        cell.set(true);
        cell.set(false);
        cell.set(false);
        cell.set(true);

        assert_eq!(transitions.try_recv().unwrap(), true);
        assert_eq!(transitions.try_recv().unwrap(), false);
        assert_eq!(transitions.try_recv().unwrap(), true);
        assert!(transitions.try_recv().is_err());
    }
}
