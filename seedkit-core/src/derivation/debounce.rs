//! Debounced, generation-tagged address derivation.
//!
//! Every input change bumps a generation counter and schedules a task that
//! waits for the settling window. When the timer fires the task only proceeds
//! if its generation is still the latest one, so a burst of keystrokes results
//! in a single call to the underlying [`AddressDeriver`]. Results are published
//! on a channel together with the generation they belong to; the consumer
//! drops anything that is no longer current.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};

use super::{AddressDeriver, DerivationError, DerivedAddress};
use crate::secret::SeedPhrase;

/// Monotonic id of an input change.
pub type Generation = u64;

/// Result of one derivation, tagged with the input it was computed for.
#[derive(Debug)]
pub struct DerivationOutcome {
    /// Generation of the input change that triggered the derivation.
    pub generation: Generation,
    /// Fingerprint of the phrase that was derived.
    pub fingerprint: [u8; 32],
    /// What the deriver returned.
    pub result: Result<DerivedAddress, DerivationError>,
}

/// Collapses rapid input changes into one derivation per settling window.
pub struct DebouncedDeriver {
    deriver: Arc<dyn AddressDeriver>,
    settle_delay: Duration,
    generation: Arc<AtomicU64>,
    outcomes: mpsc::UnboundedSender<DerivationOutcome>,
    latest_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DebouncedDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedDeriver")
            .field("settle_delay", &self.settle_delay)
            .field("generation", &self.current_generation())
            .finish_non_exhaustive()
    }
}

impl DebouncedDeriver {
    /// Creates a debouncer and the receiving end of its outcome channel.
    #[must_use]
    pub fn new(
        deriver: Arc<dyn AddressDeriver>,
        settle_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<DerivationOutcome>) {
        let (outcomes, receiver) = mpsc::unbounded_channel();
        let debouncer = Self {
            deriver,
            settle_delay,
            generation: Arc::new(AtomicU64::new(0)),
            outcomes,
            latest_task: Mutex::new(None),
        };
        (debouncer, receiver)
    }

    /// Records an input change and schedules a derivation for it.
    ///
    /// Returns the generation assigned to `phrase`. Any earlier generation is
    /// superseded from this point on: if its timer has not fired yet it never
    /// calls the deriver, and if it is already running its outcome will not be
    /// current when it arrives.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn on_input_changed(&self, phrase: SeedPhrase) -> Generation {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let deriver = Arc::clone(&self.deriver);
        let outcomes = self.outcomes.clone();
        let settle_delay = self.settle_delay;

        let task = tokio::spawn(async move {
            tokio::time::sleep(settle_delay).await;
            if current.load(Ordering::SeqCst) != generation {
                log::trace!("derivation for generation {generation} superseded before start");
                return;
            }
            let fingerprint = phrase.fingerprint();
            let result = deriver.derive_address(&phrase).await;
            drop(phrase);
            if outcomes
                .send(DerivationOutcome {
                    generation,
                    fingerprint,
                    result,
                })
                .is_err()
            {
                log::debug!("derivation outcome for generation {generation} has no receiver");
            }
        });

        if let Ok(mut latest) = self.latest_task.lock() {
            *latest = Some(task);
        }
        generation
    }

    /// The generation of the most recent input change.
    #[must_use]
    pub fn current_generation(&self) -> Generation {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether `generation` is still the latest input change.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current_generation() == generation
    }

    /// Makes every scheduled or running derivation irrelevant.
    ///
    /// The most recent task is aborted; older ones already lost the generation
    /// race and will exit or be discarded on their own.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut latest) = self.latest_task.lock() {
            if let Some(task) = latest.take() {
                task.abort();
            }
        }
    }
}

impl Drop for DebouncedDeriver {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use secrecy::ExposeSecret;

    use super::*;

    #[derive(Default)]
    struct CountingDeriver {
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl AddressDeriver for CountingDeriver {
        async fn derive_address(
            &self,
            phrase: &SeedPhrase,
        ) -> Result<DerivedAddress, DerivationError> {
            let text = phrase.expose_secret().to_string();
            self.calls.lock().unwrap().push(text.clone());
            if text == "fail" {
                return Err(DerivationError::Malformed("scripted failure".to_string()));
            }
            Ok(DerivedAddress {
                address: format!("0x{text}"),
                is_bip39: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_last_value() {
        let deriver = Arc::new(CountingDeriver::default());
        let (debouncer, mut outcomes) =
            DebouncedDeriver::new(deriver.clone(), Duration::from_millis(200));

        debouncer.on_input_changed(SeedPhrase::new("abc"));
        tokio::time::advance(Duration::from_millis(100)).await;
        let last = debouncer.on_input_changed(SeedPhrase::new("abcdef"));

        let outcome = outcomes.recv().await.expect("outcome");
        assert_eq!(outcome.generation, last);
        assert!(SeedPhrase::new("abcdef").matches_fingerprint(&outcome.fingerprint));
        assert_eq!(outcome.result.expect("derived").address, "0xabcdef");
        assert_eq!(*deriver.calls.lock().unwrap(), vec!["abcdef".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_inputs_each_derive() {
        let deriver = Arc::new(CountingDeriver::default());
        let (debouncer, mut outcomes) =
            DebouncedDeriver::new(deriver.clone(), Duration::from_millis(200));

        let first = debouncer.on_input_changed(SeedPhrase::new("one"));
        let outcome = outcomes.recv().await.expect("outcome");
        assert_eq!(outcome.generation, first);
        assert!(debouncer.is_current(first));

        let second = debouncer.on_input_changed(SeedPhrase::new("two"));
        assert!(!debouncer.is_current(first));
        let outcome = outcomes.recv().await.expect("outcome");
        assert_eq!(outcome.generation, second);
        assert_eq!(deriver.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported() {
        let deriver = Arc::new(CountingDeriver::default());
        let (debouncer, mut outcomes) =
            DebouncedDeriver::new(deriver, Duration::from_millis(200));

        debouncer.on_input_changed(SeedPhrase::new("fail"));
        let outcome = outcomes.recv().await.expect("outcome");
        assert!(matches!(outcome.result, Err(DerivationError::Malformed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_derivation() {
        let deriver = Arc::new(CountingDeriver::default());
        let (debouncer, mut outcomes) =
            DebouncedDeriver::new(deriver.clone(), Duration::from_millis(200));

        let generation = debouncer.on_input_changed(SeedPhrase::new("abc"));
        debouncer.cancel();
        assert!(!debouncer.is_current(generation));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(outcomes.try_recv().is_err());
        assert!(deriver.calls.lock().unwrap().is_empty());
    }
}
