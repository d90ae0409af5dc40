//! The single-consumer FIFO event loop.
//!
//! Producers (the scheduler, the capture worker, signal handlers) hold an
//! [`EventHandle`] and enqueue without blocking. Exactly one consumer drains
//! the queue inside [`EventLoop::start`], handing each event to an
//! [`EventHandler`].
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info};

use crate::error::DispatchError;
use crate::event::Event;

/// Receives every event drained by [`EventLoop::start`].
pub trait EventHandler {
    fn handle(&mut self, event: Event) -> Result<(), DispatchError>;
}

/// Cloneable producer side of an [`EventLoop`].
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::UnboundedSender<Event>,
    running: Arc<watch::Sender<bool>>,
}

impl EventHandle {
    /// Appends `event` to the tail of the queue. Never blocks.
    pub fn add_event(&self, event: Event) {
        if let Err(e) = self.tx.send(event) {
            // Only possible once the owning EventLoop has been dropped.
            debug!("Event loop gone; dropping {}", e.0.kind.name());
        }
    }

    /// Asks the consumer to stop. No-op if the loop is not running.
    pub fn end(&self) {
        let stopped = self.running.send_if_modified(|running| std::mem::replace(running, false));
        if stopped {
            info!("Event loop stop requested");
        }
    }

    /// Waits for the consumer to be running, then ends it. Unlike [`end`](Self::end),
    /// a request made before `start` is not lost.
    pub async fn end_when_running(&self) {
        let mut running = self.running.subscribe();
        let started = running.wait_for(|running| *running).await.is_ok();
        if started {
            self.end();
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }
}

pub struct EventLoop {
    handle: EventHandle,
    queue: Mutex<mpsc::UnboundedReceiver<Event>>,
}

static INSTANCE: OnceLock<EventLoop> = OnceLock::new();

impl EventLoop {
    /// Creates an independent, stopped loop with an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (running, _) = watch::channel(false);
        Self {
            handle: EventHandle { tx, running: Arc::new(running) },
            queue: Mutex::new(rx),
        }
    }

    /// The process-wide loop, created on first use.
    pub fn instance() -> &'static EventLoop {
        INSTANCE.get_or_init(EventLoop::new)
    }

    pub fn handle(&self) -> EventHandle {
        self.handle.clone()
    }

    #[cfg(test)]
    pub fn add_event(&self, event: Event) {
        self.handle.add_event(event);
    }

    #[cfg(test)]
    pub fn end(&self) {
        self.handle.end();
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Removes every queued event without dispatching it. Waits if a consumer
    /// is currently running.
    pub async fn drain(&self) -> Vec<Event> {
        let mut queue = self.queue.lock().await;
        std::iter::from_fn(|| queue.try_recv().ok()).collect()
    }

    /// Runs the consumer until [`end`](Self::end) is called.
    ///
    /// Returns immediately if the loop is already running. Events left in the
    /// queue when the stop is observed stay there for the next `start`.
    pub async fn start<H: EventHandler>(&self, handler: &mut H) {
        let started = self.handle.running.send_if_modified(|running| !std::mem::replace(running, true));
        if !started {
            debug!("Event loop already running; start ignored");
            return;
        }

        let mut running_rx = self.handle.running.subscribe();
        let mut queue = self.queue.lock().await;
        info!("Event loop started");

        while *running_rx.borrow_and_update() {
            tokio::select! {
                // Checked first so a stop request wins over a non-empty queue.
                biased;
                changed = running_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = queue.recv() => match event {
                    Some(event) => self.process_event(handler, event),
                    None => break,
                },
            }
        }

        info!("Event loop stopped");
    }

    /// Dispatches one event. Errors are logged and contained here.
    pub fn process_event<H: EventHandler>(&self, handler: &mut H, event: Event) {
        let kind = event.kind.name();
        match handler.handle(event) {
            Ok(()) => {}
            Err(e) if e.is_benign() => debug!("Dropped {kind}: {e}"),
            Err(e) => error!("Failed to process {kind}: {e}"),
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, HotkeyId};
    use std::time::Duration;

    fn hotkey(id: &str) -> Event {
        Event::new(EventKind::HotkeyPressed { id: HotkeyId::from(id) })
    }

    fn id_of(event: &Event) -> String {
        match &event.kind {
            EventKind::HotkeyPressed { id } => id.0.clone(),
            other => panic!("unexpected event {other:?}"),
        }
    }

    /// Records every event and stops the loop after `stop_after` of them.
    struct Recorder {
        seen: Vec<Event>,
        stop_after: usize,
        handle: EventHandle,
    }

    impl EventHandler for Recorder {
        fn handle(&mut self, event: Event) -> Result<(), DispatchError> {
            self.seen.push(event);
            if self.seen.len() == self.stop_after {
                self.handle.end();
            }
            Ok(())
        }
    }

    fn recorder(event_loop: &EventLoop, stop_after: usize) -> Recorder {
        Recorder { seen: Vec::new(), stop_after, handle: event_loop.handle() }
    }

    async fn wait_until_running(event_loop: &EventLoop) {
        for _ in 0..200 {
            if event_loop.is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("event loop never started");
    }

    // ── FIFO ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn single_producer_events_are_processed_in_enqueue_order() {
        let event_loop = EventLoop::new();
        for i in 0..50 {
            event_loop.add_event(hotkey(&i.to_string()));
        }
        let mut rec = recorder(&event_loop, 50);
        event_loop.start(&mut rec).await;

        let ids: Vec<String> = rec.seen.iter().map(id_of).collect();
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn concurrent_producers_keep_their_own_order() {
        let event_loop = Arc::new(EventLoop::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let handle = event_loop.handle();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        handle.add_event(hotkey(&format!("{p}-{i}")));
                    }
                })
            })
            .collect();

        let consumer = {
            let event_loop = Arc::clone(&event_loop);
            tokio::spawn(async move {
                let mut rec = recorder(&event_loop, 400);
                event_loop.start(&mut rec).await;
                rec.seen
            })
        };
        for p in producers {
            p.join().unwrap();
        }
        let seen = consumer.await.unwrap();

        assert_eq!(seen.len(), 400);
        for p in 0..4 {
            let order: Vec<u32> = seen
                .iter()
                .map(id_of)
                .filter_map(|id| {
                    let (producer, seq) = id.split_once('-')?;
                    (producer == p.to_string()).then(|| seq.parse().unwrap())
                })
                .collect();
            assert_eq!(order, (0..100).collect::<Vec<_>>(), "producer {p} reordered");
        }
    }

    #[tokio::test]
    async fn consumer_blocks_on_empty_queue_until_an_event_arrives() {
        let event_loop = Arc::new(EventLoop::new());
        let consumer = {
            let event_loop = Arc::clone(&event_loop);
            tokio::spawn(async move {
                let mut rec = recorder(&event_loop, 1);
                event_loop.start(&mut rec).await;
                rec.seen
            })
        };
        wait_until_running(&event_loop).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        event_loop.add_event(hotkey("late"));
        let seen = consumer.await.unwrap();
        assert_eq!(seen.iter().map(id_of).collect::<Vec<_>>(), ["late"]);
    }

    // ── Start / End ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn end_wakes_an_idle_consumer() {
        let event_loop = Arc::new(EventLoop::new());
        let consumer = {
            let event_loop = Arc::clone(&event_loop);
            tokio::spawn(async move {
                let mut rec = recorder(&event_loop, usize::MAX);
                event_loop.start(&mut rec).await;
            })
        };
        wait_until_running(&event_loop).await;
        event_loop.end();
        tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .expect("consumer did not exit after end()")
            .unwrap();
        assert!(!event_loop.is_running());
    }

    #[tokio::test]
    async fn start_while_running_is_a_no_op() {
        let event_loop = Arc::new(EventLoop::new());
        let consumer = {
            let event_loop = Arc::clone(&event_loop);
            tokio::spawn(async move {
                let mut rec = recorder(&event_loop, 1);
                event_loop.start(&mut rec).await;
                rec.seen.len()
            })
        };
        wait_until_running(&event_loop).await;

        // A second start returns at once without consuming anything.
        let mut second = recorder(&event_loop, usize::MAX);
        tokio::time::timeout(Duration::from_secs(1), event_loop.start(&mut second))
            .await
            .expect("second start blocked");
        assert!(second.seen.is_empty());
        assert!(event_loop.is_running());

        event_loop.add_event(hotkey("x"));
        assert_eq!(consumer.await.unwrap(), 1);
    }

    #[test]
    fn end_while_stopped_is_a_no_op() {
        let event_loop = EventLoop::new();
        event_loop.end();
        event_loop.end();
        assert!(!event_loop.is_running());
    }

    #[tokio::test]
    async fn stop_requested_before_start_takes_effect_once_running() {
        let event_loop = EventLoop::new();
        let stopper = {
            let handle = event_loop.handle();
            tokio::spawn(async move { handle.end_when_running().await })
        };
        tokio::task::yield_now().await;
        assert!(!stopper.is_finished());

        let mut rec = recorder(&event_loop, usize::MAX);
        tokio::time::timeout(Duration::from_secs(2), event_loop.start(&mut rec))
            .await
            .expect("loop ignored the early stop request");
        stopper.await.unwrap();
        assert!(!event_loop.is_running());
    }

    #[tokio::test]
    async fn end_when_running_stops_a_running_loop() {
        let event_loop = Arc::new(EventLoop::new());
        let consumer = {
            let event_loop = Arc::clone(&event_loop);
            tokio::spawn(async move {
                let mut rec = recorder(&event_loop, usize::MAX);
                event_loop.start(&mut rec).await;
            })
        };
        wait_until_running(&event_loop).await;
        event_loop.handle().end_when_running().await;
        tokio::time::timeout(Duration::from_secs(2), consumer).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn drain_empties_the_queue_in_order() {
        let event_loop = EventLoop::new();
        for id in ["a", "b", "c"] {
            event_loop.add_event(hotkey(id));
        }
        let drained = event_loop.drain().await;
        assert_eq!(drained.iter().map(id_of).collect::<Vec<_>>(), ["a", "b", "c"]);
        assert!(event_loop.drain().await.is_empty());
    }

    #[tokio::test]
    async fn events_left_after_end_are_kept_for_next_start() {
        let event_loop = EventLoop::new();
        for id in ["a", "b", "c"] {
            event_loop.add_event(hotkey(id));
        }
        let mut first = recorder(&event_loop, 1);
        event_loop.start(&mut first).await;
        assert_eq!(first.seen.iter().map(id_of).collect::<Vec<_>>(), ["a"]);

        let mut second = recorder(&event_loop, 2);
        event_loop.start(&mut second).await;
        assert_eq!(second.seen.iter().map(id_of).collect::<Vec<_>>(), ["b", "c"]);
    }

    // ── Dispatch failures ─────────────────────────────────────────────────────

    struct Failing {
        calls: usize,
        handle: EventHandle,
    }

    impl EventHandler for Failing {
        fn handle(&mut self, event: Event) -> Result<(), DispatchError> {
            self.calls += 1;
            if self.calls == 3 {
                self.handle.end();
            }
            Err(DispatchError::UnknownHotkey(HotkeyId(id_of(&event))))
        }
    }

    #[tokio::test]
    async fn dispatch_errors_do_not_stop_the_loop() {
        let event_loop = EventLoop::new();
        for id in ["a", "b", "c"] {
            event_loop.add_event(hotkey(id));
        }
        let mut handler = Failing { calls: 0, handle: event_loop.handle() };
        event_loop.start(&mut handler).await;
        assert_eq!(handler.calls, 3);
    }

    // ── Singleton ─────────────────────────────────────────────────────────────

    #[test]
    fn instance_is_shared_across_threads() {
        let addrs: Vec<usize> = (0..8)
            .map(|_| std::thread::spawn(|| EventLoop::instance() as *const EventLoop as usize))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().unwrap())
            .collect();
        assert!(addrs.iter().all(|&a| a == addrs[0]));
        assert!(std::ptr::eq(EventLoop::instance(), EventLoop::instance()));
    }
}
