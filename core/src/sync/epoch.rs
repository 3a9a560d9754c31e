//! Cancellation epochs.
//!
//! Every wait tied to a device's GATT session captures the current epoch's
//! token and generation. Advancing the epoch cancels all of those waits at
//! once and lets late completions detect that they belong to a stale round.

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct Epoch {
    generation: u64,
    token: CancellationToken,
}

impl Epoch {
    pub fn new() -> Self {
        Self {
            generation: 0,
            token: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token cancelled when this generation ends.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the current generation and start the next one.
    pub fn advance(&mut self) -> u64 {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.generation += 1;
        self.generation
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Epoch {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_cancels_previous_generation() {
        let mut epoch = Epoch::new();
        let first = epoch.token();
        assert_eq!(epoch.generation(), 0);

        assert_eq!(epoch.advance(), 1);
        assert!(first.is_cancelled());
        assert!(!epoch.token().is_cancelled());
    }

    #[test]
    fn test_drop_cancels_live_generation() {
        let epoch = Epoch::new();
        let token = epoch.token();
        drop(epoch);
        assert!(token.is_cancelled());
    }
}
