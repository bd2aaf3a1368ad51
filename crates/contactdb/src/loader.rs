//! Slow loader standing in for a remote contact backend
//!
//! Every load blocks the calling thread for a fixed delay before the
//! contact is synthesized. The delay can be cut short through a
//! [`CancelToken`], which fails the load with [`Error::Interrupted`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::contact::Contact;
use crate::error::{Error, Result};

/// Default artificial delay per load (4 seconds)
pub const DEFAULT_DELAY: Duration = Duration::from_secs(4);

/// Loader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// How long each load blocks before returning
    pub delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
        }
    }
}

impl LoaderConfig {
    /// Config with the given delay
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

struct Sleepers {
    /// Bumped by every cancel; a sleep fails if it changes underneath it
    generation: u64,
    /// Sleeps currently in progress
    active: usize,
}

struct CancelState {
    sleepers: Mutex<Sleepers>,
    signal: Condvar,
}

/// Interrupts the sleeps in progress on it
///
/// Clones share the same state. A cancel only fails the sleeps already
/// waiting when it fires; sleeps started afterwards run their full delay.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token with no sleepers
    pub fn new() -> Self {
        Self {
            state: Arc::new(CancelState {
                sleepers: Mutex::new(Sleepers {
                    generation: 0,
                    active: 0,
                }),
                signal: Condvar::new(),
            }),
        }
    }

    /// Wake and fail every sleep currently in progress
    pub fn cancel(&self) {
        let mut sleepers = self.state.sleepers.lock();
        sleepers.generation = sleepers.generation.wrapping_add(1);
        self.state.signal.notify_all();
    }

    /// Number of sleeps currently in progress
    pub fn sleepers(&self) -> usize {
        self.state.sleepers.lock().active
    }

    /// Block the current thread for `duration` unless cancelled meanwhile
    ///
    /// # Returns
    /// * `Ok(())` once the full duration has elapsed
    /// * `Err(Error::Interrupted)` if `cancel` fires before then
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        let mut sleepers = self.state.sleepers.lock();
        let generation = sleepers.generation;
        sleepers.active += 1;

        let result = loop {
            if sleepers.generation != generation {
                break Err(Error::Interrupted);
            }
            if self
                .state
                .signal
                .wait_until(&mut sleepers, deadline)
                .timed_out()
            {
                break Ok(());
            }
        };

        sleepers.active -= 1;
        result
    }
}

/// Loader that synthesizes contacts after a fixed delay
pub struct SlowLoader {
    config: LoaderConfig,
    cancel: CancelToken,
}

impl SlowLoader {
    /// Create a loader with its own cancel token
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_cancel(config, CancelToken::new())
    }

    /// Create a loader that sleeps on an existing cancel token
    pub fn with_cancel(config: LoaderConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Load the contact for `id`
    ///
    /// Blocks the calling thread for the configured delay.
    ///
    /// # Arguments
    /// * `id` - Contact identifier
    ///
    /// # Returns
    /// * `Result<Contact>` - The contact, or `Error::Interrupted` if cancelled
    pub fn load(&self, id: i64) -> Result<Contact> {
        self.cancel.sleep(self.config.delay)?;
        Ok(Contact::synthesize(id))
    }

    /// Configured delay per load
    pub fn delay(&self) -> Duration {
        self.config.delay
    }

    /// Token that interrupts this loader
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}
