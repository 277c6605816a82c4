/// Trigger debouncer for high-frequency "selection changed" events.
///
/// A single background task holds at most one pending context text. Every new event
/// replaces it and restarts the quiet-period timer; when the timer elapses the callback is
/// invoked once with the latest text. The debouncer keeps no suggestion state.
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct Debouncer {
    tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl Debouncer {
    pub fn spawn<F>(quiet: Duration, mut on_fire: F) -> Self
    where
        F: FnMut(String) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(async move {
            let mut pending: Option<String> = None;
            loop {
                let Some(text) = pending.take() else {
                    match rx.recv().await {
                        Some(text) => pending = Some(text),
                        None => break,
                    }
                    continue;
                };

                tokio::select! {
                    next = rx.recv() => match next {
                        Some(newer) => pending = Some(newer),
                        None => {
                            debug!("event source closed, flushing pending trigger");
                            on_fire(text);
                            break;
                        }
                    },
                    _ = tokio::time::sleep(quiet) => on_fire(text),
                }
            }
        });
        Self { tx, task }
    }

    /// Record a raw event. Returns `false` once the debouncer has shut down.
    pub fn notify(&self, context_text: impl Into<String>) -> bool {
        self.tx.send(context_text.into()).is_ok()
    }

    /// Stop accepting events, fire any pending one immediately and wait for the task.
    pub async fn finish(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::time::{sleep, Instant};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<(String, Instant)>>>, impl FnMut(String) + Send + 'static) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        (fired, move |text| sink.lock().unwrap().push((text, Instant::now())))
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_events_fires_once_with_latest_text() {
        let (fired, on_fire) = recorder();
        let debouncer = Debouncer::spawn(Duration::from_millis(750), on_fire);
        let start = Instant::now();

        debouncer.notify("first paragraph");
        sleep(Duration::from_millis(100)).await;
        debouncer.notify("second paragraph");
        sleep(Duration::from_millis(100)).await;
        debouncer.notify("third paragraph");
        sleep(Duration::from_secs(5)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "third paragraph");
        assert_eq!((fired[0].1 - start).as_millis(), 200 + 750);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_events_fire_separately() {
        let (fired, on_fire) = recorder();
        let debouncer = Debouncer::spawn(Duration::from_millis(750), on_fire);

        debouncer.notify("a");
        sleep(Duration::from_secs(1)).await;
        debouncer.notify("b");
        sleep(Duration::from_secs(1)).await;

        let texts: Vec<String> = fired.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_flushes_pending_event() {
        let (fired, on_fire) = recorder();
        let debouncer = Debouncer::spawn(Duration::from_millis(750), on_fire);

        debouncer.notify("last words");
        debouncer.finish().await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "last words");
    }

    #[tokio::test(start_paused = true)]
    async fn finish_without_events_fires_nothing() {
        let (fired, on_fire) = recorder();
        Debouncer::spawn(Duration::from_millis(750), on_fire).finish().await;
        assert!(fired.lock().unwrap().is_empty());
    }
}
