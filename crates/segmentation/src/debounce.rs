//! Debounce a stream of values: forward only the latest value, once the
//! input has been quiet for the window. Independent of what the values are
//! used for, so it can be driven by any producer.

use std::time::Duration;

use tokio::sync::mpsc;

const OUTPUT_BUFFER: usize = 16;

/// Spawn a debouncing task between `input` and the returned receiver.
///
/// A value is emitted after `window` elapses with no newer value. When the
/// input closes, a pending value is flushed immediately and the output
/// closes after it.
pub fn debounce<T>(mut input: mpsc::Receiver<T>, window: Duration) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);

    tokio::spawn(async move {
        while let Some(mut latest) = input.recv().await {
            loop {
                tokio::select! {
                    next = input.recv() => match next {
                        Some(value) => latest = value,
                        None => {
                            let _ = tx.send(latest).await;
                            return;
                        }
                    },
                    _ = tokio::time::sleep(window) => break,
                }
            }
            if tx.send(latest).await.is_err() {
                return;
            }
        }
    });

    rx
}
