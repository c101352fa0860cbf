use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::DEFAULT_DURATION_SECS;
use crate::passages::PassagePool;
use crate::runtime::{TickHandle, TickId, TimeSource};
use crate::store::{ScoreStore, BEST_WPM_KEY};

/// Characters per word in the WPM convention
pub const CHARS_PER_WORD: f64 = 5.0;

/// Floor for elapsed minutes before the first tick lands
const MIN_ELAPSED_MINUTES: f64 = 0.000001;

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub duration_secs: u64,
}

impl SessionConfig {
    /// A zero duration falls back to the default
    pub fn new(duration_secs: u64) -> Self {
        if duration_secs == 0 {
            warn!("zero test duration, using {DEFAULT_DURATION_SECS}s");
            return Self::default();
        }
        Self { duration_secs }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub wpm: u32,
    pub accuracy_percent: u32,
    pub typed_char_count: usize,
    pub time_remaining_secs: u64,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalResults {
    pub metrics: MetricsSnapshot,
    /// Best score after this run was taken into account
    pub best_wpm: u32,
    pub new_best: bool,
}

#[derive(Debug)]
pub struct SessionState {
    pub phase: Phase,
    /// Idle but accepting input; the countdown starts on the first keystroke
    pub armed: bool,
    pub started_at: Option<Instant>,
    pub time_remaining_secs: u64,
    pub typed_text: String,
    pub typed_char_count: usize,
    pub correct_count: usize,
    pub ticker: Option<TickHandle>,
}

impl SessionState {
    fn fresh(config: &SessionConfig) -> Self {
        Self {
            phase: Phase::Idle,
            armed: false,
            started_at: None,
            time_remaining_secs: config.duration_secs,
            typed_text: String::new(),
            typed_char_count: 0,
            correct_count: 0,
            ticker: None,
        }
    }
}

/// Positions where `typed` matches `reference`, over the shared prefix only
pub fn count_correct(typed: &str, reference: &str) -> usize {
    typed
        .chars()
        .zip(reference.chars())
        .filter(|(t, r)| t == r)
        .count()
}

/// WPM from correct characters; zero when the ratio is not finite
pub fn words_per_minute(correct_count: usize, elapsed_minutes: f64) -> u32 {
    let words = correct_count as f64 / CHARS_PER_WORD;
    let wpm = (words / elapsed_minutes).round();
    if wpm.is_finite() {
        wpm as u32
    } else {
        0
    }
}

pub fn accuracy_percent(correct_count: usize, typed_char_count: usize) -> u32 {
    if typed_char_count == 0 {
        return 0;
    }
    (100.0 * correct_count as f64 / typed_char_count as f64).round() as u32
}

/// One timed typing test against a reference paragraph, plus the best score
/// carried between tests.
///
/// Driven by three events: [`start`](Self::start), [`handle_input`](Self::handle_input)
/// and [`tick`](Self::tick). Calls that make no sense in the current phase
/// leave the session untouched.
#[derive(Debug)]
pub struct TypingSession<S: ScoreStore, T: TimeSource> {
    config: SessionConfig,
    passages: PassagePool,
    reference: String,
    state: SessionState,
    best_wpm: u32,
    results: Option<FinalResults>,
    store: S,
    time: T,
}

impl<S: ScoreStore, T: TimeSource> TypingSession<S, T> {
    pub fn new(config: SessionConfig, passages: PassagePool, store: S, time: T) -> Self {
        let config = SessionConfig::new(config.duration_secs);
        let best_wpm = store.read(BEST_WPM_KEY).unwrap_or(0);
        let reference = passages.pick();
        debug!(best_wpm, duration_secs = config.duration_secs, "session created");

        Self {
            state: SessionState::fresh(&config),
            config,
            passages,
            reference,
            best_wpm,
            results: None,
            store,
            time,
        }
    }

    pub fn configure(&mut self, duration_secs: u64) {
        if self.state.phase == Phase::Running {
            debug!("configure ignored while running");
            return;
        }
        self.reconfigure(SessionConfig::new(duration_secs));
    }

    /// Arm the session: the next input starts the countdown
    pub fn start(&mut self) {
        if self.state.phase != Phase::Idle {
            debug!(phase = %self.state.phase, "start ignored");
            return;
        }
        self.reconfigure(self.config);
        self.state.armed = true;
        debug!(duration_secs = self.config.duration_secs, "session armed");
    }

    /// Back to a fresh idle session with the current duration, from any phase
    pub fn reset(&mut self) {
        self.reconfigure(self.config);
    }

    pub fn handle_input(&mut self, new_text: &str) -> MetricsSnapshot {
        if !self.accepts_input() {
            return self.metrics_snapshot();
        }

        if self.state.phase == Phase::Idle {
            self.state.phase = Phase::Running;
            self.state.armed = false;
            self.state.started_at = Some(self.time.now());
            self.state.time_remaining_secs = self.config.duration_secs;
            self.state.ticker = Some(self.time.every(TICK_PERIOD));
            info!(duration_secs = self.config.duration_secs, "test started");
        }

        self.state.typed_text.clear();
        self.state.typed_text.push_str(new_text);
        self.state.typed_char_count = new_text.chars().count();
        self.state.correct_count = count_correct(new_text, &self.reference);

        self.metrics_snapshot()
    }

    pub fn tick(&mut self) -> MetricsSnapshot {
        if self.state.phase != Phase::Running {
            return self.metrics_snapshot();
        }

        self.state.time_remaining_secs = self.state.time_remaining_secs.saturating_sub(1);
        if self.state.time_remaining_secs == 0 {
            if let Some(results) = self.finish() {
                return results.metrics;
            }
        }
        self.metrics_snapshot()
    }

    /// End the run. Repeated calls return the same results without side effects;
    /// `None` if no run has happened.
    pub fn finish(&mut self) -> Option<FinalResults> {
        match self.state.phase {
            Phase::Idle => None,
            Phase::Finished => self.results,
            Phase::Running => {
                self.cancel_ticker();
                self.state.phase = Phase::Finished;

                let metrics = self.metrics_snapshot();
                let new_best = metrics.wpm > self.best_wpm;
                if new_best {
                    self.best_wpm = metrics.wpm;
                    if let Err(err) = self.store.write(BEST_WPM_KEY, metrics.wpm) {
                        warn!(%err, wpm = metrics.wpm, "failed to persist best score");
                    }
                }

                let results = FinalResults {
                    metrics,
                    best_wpm: self.best_wpm,
                    new_best,
                };
                info!(
                    wpm = metrics.wpm,
                    accuracy = metrics.accuracy_percent,
                    chars = metrics.typed_char_count,
                    new_best,
                    "test finished"
                );
                self.results = Some(results);
                self.results
            }
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let duration = self.config.duration_secs as f64;
        let elapsed_minutes = match self.state.phase {
            Phase::Finished => duration / 60.0,
            _ => ((duration - self.state.time_remaining_secs as f64) / 60.0)
                .max(MIN_ELAPSED_MINUTES),
        };

        MetricsSnapshot {
            wpm: words_per_minute(self.state.correct_count, elapsed_minutes),
            accuracy_percent: accuracy_percent(
                self.state.correct_count,
                self.state.typed_char_count,
            ),
            typed_char_count: self.state.typed_char_count,
            time_remaining_secs: self.state.time_remaining_secs,
        }
    }

    /// Whether a tick from timer `id` belongs to the live run
    pub fn owns_tick(&self, id: TickId) -> bool {
        self.state
            .ticker
            .as_ref()
            .is_some_and(|ticker| ticker.id() == id)
    }

    pub fn accepts_input(&self) -> bool {
        match self.state.phase {
            Phase::Idle => self.state.armed,
            Phase::Running => true,
            Phase::Finished => false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_armed(&self) -> bool {
        self.state.armed
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn reference_text(&self) -> &str {
        &self.reference
    }

    pub fn typed_text(&self) -> &str {
        &self.state.typed_text
    }

    pub fn correct_count(&self) -> usize {
        self.state.correct_count
    }

    pub fn best_wpm(&self) -> u32 {
        self.best_wpm
    }

    pub fn results(&self) -> Option<FinalResults> {
        self.results
    }

    /// Wall-clock time since the first keystroke, for display only
    pub fn elapsed_wall(&self) -> Option<Duration> {
        self.state
            .started_at
            .map(|start| self.time.now().saturating_duration_since(start))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn time_source(&self) -> &T {
        &self.time
    }

    pub fn time_source_mut(&mut self) -> &mut T {
        &mut self.time
    }

    fn reconfigure(&mut self, config: SessionConfig) {
        self.cancel_ticker();
        self.config = config;
        self.state = SessionState::fresh(&config);
        self.reference = self.passages.pick();
        self.results = None;
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.state.ticker.take() {
            debug!(tick_id = ticker.id().0, "cancelling ticker");
            ticker.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualTimeSource;
    use crate::store::MemoryScoreStore;
    use assert_matches::assert_matches;

    const FOX: &str = "The quick brown fox jumps over the lazy dog.";

    fn session_with(
        text: &str,
        secs: u64,
        store: MemoryScoreStore,
    ) -> TypingSession<MemoryScoreStore, ManualTimeSource> {
        TypingSession::new(
            SessionConfig::new(secs),
            PassagePool::single(text),
            store,
            ManualTimeSource::new(),
        )
    }

    fn session(text: &str, secs: u64) -> TypingSession<MemoryScoreStore, ManualTimeSource> {
        session_with(text, secs, MemoryScoreStore::new())
    }

    fn run_out_clock<S: ScoreStore>(session: &mut TypingSession<S, ManualTimeSource>) {
        for _ in 0..session.config().duration_secs {
            session.tick();
        }
    }

    #[test]
    fn new_session_is_idle_and_unarmed() {
        let s = session(FOX, 60);
        assert_eq!(s.phase(), Phase::Idle);
        assert!(!s.is_armed());
        assert_eq!(s.reference_text(), FOX);
        assert_eq!(s.metrics_snapshot().time_remaining_secs, 60);
        assert_eq!(s.best_wpm(), 0);
    }

    #[test]
    fn best_score_is_loaded_from_store() {
        let s = session_with(FOX, 60, MemoryScoreStore::with_value(BEST_WPM_KEY, 55));
        assert_eq!(s.best_wpm(), 55);
    }

    #[test]
    fn zero_duration_falls_back_to_default() {
        let s = session(FOX, 0);
        assert_eq!(s.config().duration_secs, DEFAULT_DURATION_SECS);
    }

    #[test]
    fn input_before_start_is_ignored() {
        let mut s = session(FOX, 60);
        let snap = s.handle_input("The");

        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.typed_text(), "");
        assert_eq!(snap.typed_char_count, 0);
        assert!(s.time_source().issued().is_empty());
    }

    #[test]
    fn start_arms_without_starting_the_clock() {
        let mut s = session(FOX, 60);
        s.start();

        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.is_armed());
        assert!(s.accepts_input());
        assert!(s.time_source().issued().is_empty());
    }

    #[test]
    fn first_input_starts_running_and_registers_one_tick() {
        let mut s = session(FOX, 60);
        s.start();
        s.handle_input("T");

        assert_eq!(s.phase(), Phase::Running);
        assert!(!s.is_armed());
        assert!(s.state().started_at.is_some());
        let issued = s.time_source().issued();
        assert_eq!(issued.len(), 1);
        assert_eq!(
            s.time_source().period_of(issued[0]),
            Some(Duration::from_secs(1))
        );
        assert!(s.owns_tick(issued[0]));

        s.handle_input("Th");
        assert_eq!(s.time_source().issued().len(), 1);
    }

    #[test]
    fn exact_prefix_is_fully_correct() {
        let mut s = session(FOX, 60);
        s.start();
        for end in 1..=FOX.len() {
            let snap = s.handle_input(&FOX[..end]);
            assert_eq!(s.correct_count(), end);
            assert_eq!(snap.typed_char_count, end);
            assert_eq!(snap.accuracy_percent, 100);
        }
    }

    #[test]
    fn text_past_the_reference_never_adds_correct_chars() {
        let mut s = session("abc", 60);
        s.start();
        s.handle_input("abc");
        assert_eq!(s.correct_count(), 3);

        let snap = s.handle_input("abcabc");
        assert_eq!(s.correct_count(), 3);
        assert_eq!(snap.typed_char_count, 6);
        assert_eq!(snap.accuracy_percent, 50);
    }

    #[test]
    fn edits_recompute_from_scratch() {
        let mut s = session("hello", 60);
        s.start();
        s.handle_input("hxllo");
        assert_eq!(s.correct_count(), 4);

        s.handle_input("h");
        assert_eq!(s.correct_count(), 1);
        assert_eq!(s.metrics_snapshot().typed_char_count, 1);

        s.handle_input("");
        assert_eq!(s.correct_count(), 0);
        assert_eq!(s.metrics_snapshot().accuracy_percent, 0);
        assert_eq!(s.phase(), Phase::Running);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let mut s = session("héllo", 60);
        s.start();
        let snap = s.handle_input("héllo");
        assert_eq!(snap.typed_char_count, 5);
        assert_eq!(s.correct_count(), 5);
    }

    #[test]
    fn ticks_count_down_and_finish_exactly_once() {
        let mut s = session(FOX, 3);
        s.start();
        s.handle_input("The");

        assert_eq!(s.tick().time_remaining_secs, 2);
        assert_eq!(s.tick().time_remaining_secs, 1);
        assert_eq!(s.phase(), Phase::Running);

        let last = s.tick();
        assert_eq!(last.time_remaining_secs, 0);
        assert_eq!(s.phase(), Phase::Finished);
        assert!(s.time_source().active().is_empty());

        // further ticks are inert
        let after = s.tick();
        assert_eq!(after, last);
        assert_eq!(s.phase(), Phase::Finished);
    }

    #[test]
    fn tick_while_idle_is_ignored() {
        let mut s = session(FOX, 10);
        s.start();
        assert_eq!(s.tick().time_remaining_secs, 10);
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn fox_sentence_over_a_minute_scores_nine() {
        let mut s = session(FOX, 60);
        s.start();
        s.handle_input(FOX);
        assert_eq!(s.correct_count(), 44);
        run_out_clock(&mut s);

        let results = s.finish().unwrap();
        assert_eq!(results.metrics.accuracy_percent, 100);
        assert_eq!(results.metrics.typed_char_count, FOX.len());
        // 44 correct / 5 = 8.8 words over one minute
        assert_eq!(results.metrics.wpm, 9);
        assert_eq!(results.best_wpm, 9);
        assert!(results.new_best);
    }

    #[test]
    fn empty_text_at_finish_scores_zero() {
        let mut s = session(FOX, 5);
        s.start();
        s.handle_input("T");
        s.handle_input("");

        let results = s.finish().unwrap();
        assert_eq!(results.metrics.typed_char_count, 0);
        assert_eq!(results.metrics.accuracy_percent, 0);
        assert_eq!(results.metrics.wpm, 0);
        assert!(!results.new_best);
        assert_eq!(s.store().writes(), 0);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut s = session("aaaaa aaaaa", 60);
        s.start();
        s.handle_input("aaaaa aaaaa");

        let first = s.finish();
        assert_matches!(first, Some(FinalResults { new_best: true, .. }));
        assert_eq!(s.store().writes(), 1);

        let second = s.finish();
        assert_eq!(first, second);
        assert_eq!(s.store().writes(), 1);
        assert_eq!(s.time_source().issued().len(), 1);
    }

    #[test]
    fn finish_while_idle_returns_nothing() {
        let mut s = session(FOX, 60);
        assert!(s.finish().is_none());
        s.start();
        assert!(s.finish().is_none());
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn final_wpm_uses_configured_duration_not_time_left() {
        let mut s = session("aaaaaaaaaa", 60);
        s.start();
        s.handle_input("aaaaaaaaaa");
        for _ in 0..30 {
            s.tick();
        }
        // 2 words in half a minute live
        assert_eq!(s.metrics_snapshot().wpm, 4);

        // finishing early still divides by the full minute
        let results = s.finish().unwrap();
        assert_eq!(results.metrics.wpm, 2);
        assert_eq!(results.metrics.time_remaining_secs, 30);
    }

    #[test]
    fn live_wpm_before_first_tick_is_finite() {
        let mut s = session("abcde", 60);
        s.start();
        let snap = s.handle_input("abcde");
        // one word over the epsilon floor
        assert_eq!(snap.wpm, 1_000_000);
    }

    #[test]
    fn best_score_only_moves_on_strict_improvement() {
        let mut store = MemoryScoreStore::with_value(BEST_WPM_KEY, 9);
        let mut s = session_with(FOX, 60, store.clone());
        s.start();
        s.handle_input(FOX);
        run_out_clock(&mut s);

        let results = s.finish().unwrap();
        assert_eq!(results.metrics.wpm, 9);
        assert!(!results.new_best);
        assert_eq!(results.best_wpm, 9);
        assert_eq!(s.store().writes(), 0);

        store.write(BEST_WPM_KEY, 50).unwrap();
        let mut s = session_with("abc", 60, store);
        s.start();
        s.handle_input("abc");
        let results = s.finish().unwrap();
        assert_eq!(results.best_wpm, 50);
        assert_eq!(s.store().read(BEST_WPM_KEY), Some(50));
    }

    #[test]
    fn best_score_carries_across_runs() {
        let mut s = session("aaaaa", 60);
        s.start();
        s.handle_input("aaaaa");
        assert_eq!(s.finish().unwrap().best_wpm, 1);

        s.reset();
        s.start();
        s.handle_input("a");
        let results = s.finish().unwrap();
        assert_eq!(results.metrics.wpm, 0);
        assert_eq!(results.best_wpm, 1);
        assert_eq!(s.store().read(BEST_WPM_KEY), Some(1));
    }

    #[test]
    fn configure_twice_keeps_the_last_duration() {
        let mut s = TypingSession::new(
            SessionConfig::new(60),
            PassagePool::builtin(),
            MemoryScoreStore::new(),
            ManualTimeSource::new(),
        );
        s.configure(30);
        s.configure(60);

        assert_eq!(s.config().duration_secs, 60);
        assert_eq!(s.metrics_snapshot().time_remaining_secs, 60);
        assert_eq!(s.phase(), Phase::Idle);
        assert!(!s.is_armed());
        assert!(PassagePool::builtin().contains(s.reference_text()));
        assert_eq!(s.typed_text(), "");
    }

    #[test]
    fn configure_while_running_is_ignored() {
        let mut s = session(FOX, 60);
        s.start();
        s.handle_input("Th");
        s.configure(15);

        assert_eq!(s.config().duration_secs, 60);
        assert_eq!(s.phase(), Phase::Running);
        assert_eq!(s.typed_text(), "Th");
    }

    #[test]
    fn configure_after_finish_clears_results() {
        let mut s = session(FOX, 1);
        s.start();
        s.handle_input("T");
        s.tick();
        assert_eq!(s.phase(), Phase::Finished);

        s.configure(30);
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.results().is_none());
        assert_eq!(s.metrics_snapshot(), MetricsSnapshot {
            wpm: 0,
            accuracy_percent: 0,
            typed_char_count: 0,
            time_remaining_secs: 30,
        });
    }

    #[test]
    fn start_is_ignored_outside_idle() {
        let mut s = session(FOX, 60);
        s.start();
        s.handle_input("The");
        s.start();
        assert_eq!(s.phase(), Phase::Running);
        assert_eq!(s.typed_text(), "The");

        s.finish();
        s.start();
        assert_eq!(s.phase(), Phase::Finished);
        assert!(!s.accepts_input());
    }

    #[test]
    fn input_after_finish_is_ignored() {
        let mut s = session(FOX, 60);
        s.start();
        s.handle_input("The");
        let results = s.finish().unwrap();

        let snap = s.handle_input("The quick");
        assert_eq!(snap, results.metrics);
        assert_eq!(s.typed_text(), "The");
    }

    #[test]
    fn reset_mid_run_cancels_the_ticker() {
        let mut s = session(FOX, 60);
        s.start();
        s.handle_input("The");
        let old = s.time_source().issued()[0];

        s.reset();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(!s.owns_tick(old));
        assert!(s.time_source().active().is_empty());

        s.start();
        s.handle_input("T");
        let issued = s.time_source().issued();
        assert_eq!(issued.len(), 2);
        assert!(s.owns_tick(issued[1]));
        assert!(!s.owns_tick(old));
    }

    #[test]
    fn elapsed_wall_follows_the_clock() {
        let mut s = session(FOX, 60);
        assert!(s.elapsed_wall().is_none());
        s.start();
        s.handle_input("T");
        s.time_source_mut().advance(Duration::from_millis(2500));
        assert_eq!(s.elapsed_wall(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn metric_helpers() {
        assert_eq!(count_correct("abc", "abd"), 2);
        assert_eq!(count_correct("", "abc"), 0);
        assert_eq!(count_correct("abcdef", "abc"), 3);
        assert_eq!(words_per_minute(0, 0.0), 0);
        assert_eq!(words_per_minute(50, 1.0), 10);
        assert_eq!(words_per_minute(25, 0.5), 10);
        assert_eq!(accuracy_percent(0, 0), 0);
        assert_eq!(accuracy_percent(2, 3), 67);
    }
}
