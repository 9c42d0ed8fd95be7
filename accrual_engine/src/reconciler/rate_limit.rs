use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use log::*;
use tokio::time::Instant;

/// No single pause lasts longer than this, whatever the oracle asks for.
pub const MAX_PAUSE: Duration = Duration::from_secs(24 * 60 * 60);

/// A process-wide "resume not before" timestamp. Every worker waits for the gate to open before calling the oracle,
/// so a single 429 stops all oracle traffic until the pause has elapsed.
#[derive(Debug, Clone, Default)]
pub struct RateLimitGate {
    resume_at: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the gate for `pause`, but never for longer than [`MAX_PAUSE`]. An existing pause that ends later is left
    /// as is.
    pub fn pause_for(&self, pause: Duration) -> Instant {
        let pause = pause.min(MAX_PAUSE);
        let until = Instant::now() + pause;
        let mut resume_at = self.lock();
        match *resume_at {
            Some(existing) if existing >= until => existing,
            _ => {
                info!("🚦️ Oracle calls paused for {}ms", pause.as_millis());
                *resume_at = Some(until);
                until
            },
        }
    }

    /// The time at which oracle calls may resume, if a pause is in effect.
    pub fn resume_at(&self) -> Option<Instant> {
        let resume_at = *self.lock();
        resume_at.filter(|t| *t > Instant::now())
    }

    pub fn is_paused(&self) -> bool {
        self.resume_at().is_some()
    }

    /// Returns once no pause is in effect. A pause that is extended while waiting is honoured.
    pub async fn wait_until_open(&self) {
        while let Some(until) = self.resume_at() {
            trace!("🚦️ Waiting for the rate limit pause to end");
            tokio::time::sleep_until(until).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.resume_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}
