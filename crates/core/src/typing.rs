use std::time::Duration;

use tokio::time::{Instant, sleep_until};

pub const DEFAULT_CHARS_PER_TICK: usize = 2;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingConfig {
    pub chars_per_tick: usize,
    pub tick_interval: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            chars_per_tick: DEFAULT_CHARS_PER_TICK,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Reveals a target string a few characters per tick while it is settling.
///
/// `rendered_output` is always a prefix of the latest source. A source that
/// extends the revealed prefix (a streamed continuation) keeps the progress;
/// anything else restarts the reveal from the beginning.
#[derive(Debug, Clone)]
pub struct TypingSimulator {
    config: TypingConfig,
    source: String,
    revealed_bytes: usize,
    revealed_chars: usize,
    settling: bool,
    next_tick_at: Option<Instant>,
}

impl TypingSimulator {
    pub fn new(config: TypingConfig) -> Self {
        Self {
            config: TypingConfig {
                chars_per_tick: config.chars_per_tick.max(1),
                tick_interval: config.tick_interval,
            },
            source: String::new(),
            revealed_bytes: 0,
            revealed_chars: 0,
            settling: false,
            next_tick_at: None,
        }
    }

    pub fn config(&self) -> TypingConfig {
        self.config
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn rendered_output(&self) -> &str {
        &self.source[..self.revealed_bytes]
    }

    /// Number of revealed characters.
    pub fn revealed_length(&self) -> usize {
        self.revealed_chars
    }

    pub fn is_settling(&self) -> bool {
        self.settling
    }

    /// True while part of the source is still hidden.
    pub fn is_active(&self) -> bool {
        self.revealed_bytes < self.source.len()
    }

    pub fn set_source(&mut self, text: &str) {
        if text == self.source {
            return;
        }

        if !text.starts_with(self.rendered_output()) {
            tracing::trace!(
                previous_len = self.source.len(),
                next_len = text.len(),
                "typing source diverged; restarting reveal"
            );
            self.revealed_bytes = 0;
            self.revealed_chars = 0;
        }

        self.source.clear();
        self.source.push_str(text);

        if !self.settling {
            self.flush();
        }
    }

    /// Toggles rate-limited reveal. Leaving the settling state flushes.
    pub fn set_settling(&mut self, settling: bool) {
        self.settling = settling;
        if !settling {
            self.flush();
        }
    }

    /// Reveals everything that is still hidden.
    pub fn flush(&mut self) {
        if self.is_active() {
            self.revealed_chars += self.source[self.revealed_bytes..].chars().count();
            self.revealed_bytes = self.source.len();
        }
        self.next_tick_at = None;
    }

    /// Advances the reveal by one step. Returns false when nothing was hidden.
    pub fn tick(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }

        let hidden = &self.source[self.revealed_bytes..];
        let step = self.config.chars_per_tick;
        let (advance_bytes, advance_chars) = match hidden.char_indices().nth(step) {
            Some((offset, _)) => (offset, step),
            None => (hidden.len(), hidden.chars().count()),
        };

        self.revealed_bytes += advance_bytes;
        self.revealed_chars += advance_chars;
        true
    }

    /// Waits for the next tick deadline and advances.
    ///
    /// Never resolves while nothing is hidden. Cancel-safe: the pending
    /// deadline survives a dropped future.
    pub async fn next_tick(&mut self) -> bool {
        if !self.is_active() {
            std::future::pending::<()>().await;
        }

        let interval = self.config.tick_interval;
        let deadline = *self
            .next_tick_at
            .get_or_insert_with(|| Instant::now() + interval);
        sleep_until(deadline).await;
        self.next_tick_at = None;
        self.tick()
    }

    pub fn reset(&mut self) {
        self.source.clear();
        self.revealed_bytes = 0;
        self.revealed_chars = 0;
        self.settling = false;
        self.next_tick_at = None;
    }
}

impl Default for TypingSimulator {
    fn default() -> Self {
        Self::new(TypingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settling_simulator(chars_per_tick: usize) -> TypingSimulator {
        let mut simulator = TypingSimulator::new(TypingConfig {
            chars_per_tick,
            tick_interval: Duration::from_millis(10),
        });
        simulator.set_settling(true);
        simulator
    }

    #[test]
    fn settling_reveals_at_bounded_rate() {
        let mut simulator = settling_simulator(2);
        simulator.set_source("Hello");

        assert_eq!(simulator.rendered_output(), "");
        assert!(simulator.tick());
        assert_eq!(simulator.rendered_output(), "He");
        assert!(simulator.tick());
        assert!(simulator.tick());
        assert_eq!(simulator.rendered_output(), "Hello");
        assert!(!simulator.tick());
        assert_eq!(simulator.revealed_length(), 5);
    }

    #[test]
    fn not_settling_reveals_immediately() {
        let mut simulator = TypingSimulator::default();
        simulator.set_source("done already");
        assert_eq!(simulator.rendered_output(), "done already");
        assert!(!simulator.is_active());
    }

    #[test]
    fn clearing_settling_flushes_remaining_text() {
        let mut simulator = settling_simulator(1);
        simulator.set_source("abc");
        simulator.tick();
        simulator.set_settling(false);
        assert_eq!(simulator.rendered_output(), "abc");
    }

    #[test]
    fn streamed_continuation_keeps_progress() {
        let mut simulator = settling_simulator(1);
        simulator.set_source("He");
        simulator.tick();
        simulator.tick();
        simulator.set_source("Hello there");
        assert_eq!(simulator.rendered_output(), "He");
        simulator.tick();
        assert_eq!(simulator.rendered_output(), "Hel");
    }

    #[test]
    fn diverging_source_restarts_from_scratch() {
        let mut simulator = settling_simulator(3);
        simulator.set_source("first answer");
        simulator.tick();
        simulator.set_source("second answer");
        assert_eq!(simulator.rendered_output(), "");
        assert_eq!(simulator.revealed_length(), 0);
        simulator.tick();
        assert_eq!(simulator.rendered_output(), "sec");
    }

    #[test]
    fn multibyte_text_never_splits_a_character() {
        let mut simulator = settling_simulator(1);
        simulator.set_source("日本語です");
        simulator.tick();
        simulator.tick();
        assert_eq!(simulator.rendered_output(), "日本");
        assert_eq!(simulator.revealed_length(), 2);
    }

    #[test]
    fn rendered_output_is_prefix_of_every_snapshot() {
        let snapshots = ["H", "He", "Hello", "Hello there", "Bye", "Bye now"];
        let mut simulator = settling_simulator(2);

        for snapshot in snapshots {
            simulator.set_source(snapshot);
            assert!(snapshot.starts_with(simulator.rendered_output()));
            simulator.tick();
            assert!(snapshot.starts_with(simulator.rendered_output()));
        }

        simulator.set_settling(false);
        assert_eq!(simulator.rendered_output(), "Bye now");
    }

    #[tokio::test(start_paused = true)]
    async fn next_tick_follows_interval() {
        let mut simulator = settling_simulator(1);
        simulator.set_source("ab");

        let start = Instant::now();
        assert!(simulator.next_tick().await);
        assert_eq!(Instant::now() - start, Duration::from_millis(10));
        assert!(simulator.next_tick().await);
        assert_eq!(simulator.rendered_output(), "ab");
        assert_eq!(Instant::now() - start, Duration::from_millis(20));
    }

    #[test]
    fn reset_forgets_source() {
        let mut simulator = settling_simulator(1);
        simulator.set_source("abc");
        simulator.reset();
        assert_eq!(simulator.source(), "");
        assert!(!simulator.is_settling());
        assert!(!simulator.is_active());
    }
}
