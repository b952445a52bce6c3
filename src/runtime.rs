use std::cell::Cell;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyModifiers};

use crate::session::{Clock, SessionSnapshot, SessionTimer};

/// Cadence of the live session view.
pub const SESSION_TICK: Duration = Duration::from_secs(1);

/// Unified event type consumed by the watch loop
#[derive(Clone, Debug)]
pub enum WatchEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    /// The event source hung up; nothing can stop the view any more.
    Closed,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait WatchEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<WatchEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<WatchEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if tx.send(WatchEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if tx.send(WatchEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("terminal event reader stopped: {}", e);
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<WatchEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(SESSION_TICK)
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<WatchEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<WatchEvent>) -> Self {
        Self { rx }
    }
}

impl WatchEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<WatchEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time.
///
/// Ticks follow a fixed deadline, so a stream of key or resize events never
/// delays them.
pub struct Runner<E: WatchEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    next_tick: Cell<Instant>,
}

impl<E: WatchEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        let next_tick = Cell::new(Instant::now() + ticker.interval());
        Self {
            event_source,
            ticker,
            next_tick,
        }
    }

    /// Blocks until the next tick deadline and returns whatever event arrives
    /// first, or Tick once the deadline has passed
    pub fn step(&self) -> WatchEvent {
        loop {
            let now = Instant::now();
            let deadline = self.next_tick.get();

            if now >= deadline {
                let interval = self.ticker.interval();
                let next = deadline + interval;
                // More than a whole interval behind: restart the cadence from now.
                self.next_tick
                    .set(if next <= now { now + interval } else { next });
                return WatchEvent::Tick;
            }

            match self.event_source.recv_timeout(deadline - now) {
                Ok(ev) => return ev,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return WatchEvent::Closed,
            }
        }
    }
}

/// `q`, `Esc` or `Ctrl-C`.
pub fn is_stop_key(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// What a finished watch loop saw.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSummary {
    pub ticks: u64,
    pub last: Option<SessionSnapshot>,
}

/// Re-evaluate `timer` on every tick until a stop key arrives or the event
/// source closes. `render` gets
/// the snapshot to display, which stays stale across ticks that could not be
/// evaluated.
pub fn run_session_timer<E, T, C, F>(
    runner: &Runner<E, T>,
    timer: &mut SessionTimer,
    clock: &C,
    mut render: F,
) -> io::Result<WatchSummary>
where
    E: WatchEventSource,
    T: Ticker,
    C: Clock,
    F: FnMut(Option<&SessionSnapshot>) -> io::Result<()>,
{
    let mut ticks = 0;
    render(timer.tick(clock.now()))?;

    loop {
        match runner.step() {
            WatchEvent::Tick => {
                ticks += 1;
                render(timer.tick(clock.now()))?;
            }
            WatchEvent::Resize => render(timer.last())?,
            WatchEvent::Key(key) if is_stop_key(&key) => break,
            WatchEvent::Key(_) => {}
            WatchEvent::Closed => {
                log::warn!("event source closed, stopping session view");
                break;
            }
        }
    }

    log::debug!("session view stopped after {} ticks", ticks);

    Ok(WatchSummary {
        ticks,
        last: timer.last().cloned(),
    })
}
