use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// Identifies the periodic timer a tick came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickId(pub u64);

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick(TickId),
}

/// Cancellation handle for a periodic tick registered with a [`TimeSource`]
#[derive(Debug)]
pub struct TickHandle {
    id: TickId,
    cancelled: Arc<AtomicBool>,
}

impl TickHandle {
    pub fn new(id: TickId) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> TickId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Consumes the handle so a timer can only be cancelled once
    pub fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

/// Environment the typing session needs: a monotonic clock and a periodic scheduler
pub trait TimeSource {
    fn now(&self) -> Instant;
    /// Start delivering ticks every `period` until the returned handle is cancelled.
    fn every(&mut self, period: Duration) -> TickHandle;
}

/// Production time source: a timer thread per registration posts
/// [`AppEvent::Tick`] into the app's event channel.
#[derive(Debug, Clone)]
pub struct ChannelTimeSource {
    tx: Sender<AppEvent>,
    next_id: u64,
}

impl ChannelTimeSource {
    pub fn new(tx: Sender<AppEvent>) -> Self {
        Self { tx, next_id: 0 }
    }
}

impl TimeSource for ChannelTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn every(&mut self, period: Duration) -> TickHandle {
        self.next_id += 1;
        let handle = TickHandle::new(TickId(self.next_id));
        let id = handle.id();
        let cancelled = handle.flag();
        let tx = self.tx.clone();

        thread::spawn(move || loop {
            thread::sleep(period);
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            if tx.send(AppEvent::Tick(id)).is_err() {
                break;
            }
        });

        handle
    }
}

/// Deterministic time source for tests: the clock only moves when told to
/// and ticks are delivered by calling the session directly.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Instant,
    next_id: u64,
    issued: Vec<(TickId, Duration, Arc<AtomicBool>)>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
            next_id: 0,
            issued: Vec::new(),
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Every timer ever registered, in order
    pub fn issued(&self) -> Vec<TickId> {
        self.issued.iter().map(|(id, _, _)| *id).collect()
    }

    pub fn period_of(&self, id: TickId) -> Option<Duration> {
        self.issued
            .iter()
            .find(|(issued, _, _)| *issued == id)
            .map(|(_, period, _)| *period)
    }

    /// Timers that have not been cancelled
    pub fn active(&self) -> Vec<TickId> {
        self.issued
            .iter()
            .filter(|(_, _, cancelled)| !cancelled.load(Ordering::SeqCst))
            .map(|(id, _, _)| *id)
            .collect()
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.now
    }

    fn every(&mut self, period: Duration) -> TickHandle {
        self.next_id += 1;
        let handle = TickHandle::new(TickId(self.next_id));
        self.issued.push((handle.id(), period, handle.flag()));
        handle
    }
}

/// Source of terminal events (keyboard, resize, ticks)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let key_tx = tx.clone();

        thread::spawn(move || loop {
            let sent = match event::read() {
                Ok(CtEvent::Key(key)) => key_tx.send(AppEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => key_tx.send(AppEvent::Resize),
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if sent.is_err() {
                break;
            }
        });

        Self { tx, rx }
    }

    /// Time source whose ticks arrive through this event source
    pub fn time_source(&self) -> ChannelTimeSource {
        ChannelTimeSource::new(self.tx.clone())
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event at a time
pub struct Runner<E: EventSource> {
    event_source: E,
    poll_interval: Duration,
}

impl<E: EventSource> Runner<E> {
    pub fn new(event_source: E, poll_interval: Duration) -> Self {
        Self {
            event_source,
            poll_interval,
        }
    }

    pub fn event_source(&self) -> &E {
        &self.event_source
    }

    /// Blocks up to the poll interval; `None` when nothing arrived
    pub fn step(&self) -> Option<AppEvent> {
        self.event_source.recv_timeout(self.poll_interval).ok()
    }
}
