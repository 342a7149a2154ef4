//! Debounced search input.
//!
//! Raw text-change events are collapsed into effective queries: a change only
//! fires after a quiet window, only the latest value in a burst survives, and
//! consecutive duplicates are suppressed. An explicit submit (search action
//! or clear affordance) bypasses the window, emitting immediately and
//! cancelling whatever was pending.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
enum RawInput {
  /// Text changed; `None` means the input was cleared.
  Changed(Option<String>),
  /// Explicit search trigger, delivered without debouncing.
  Submit(String),
}

/// Handle feeding raw input events into the debounce task.
///
/// Dropping the handle (and any clones) ends the effective-query stream.
#[derive(Clone)]
pub struct SearchInput {
  tx: mpsc::UnboundedSender<RawInput>,
}

impl SearchInput {
  /// Spawn the debounce task and return the input handle plus the stream of
  /// effective queries.
  pub fn new(debounce: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    tokio::spawn(run(rx, out_tx, debounce));

    (Self { tx }, out_rx)
  }

  /// Report a raw text change. Restarts the quiet window.
  pub fn changed(&self, text: Option<String>) {
    let _ = self.tx.send(RawInput::Changed(text));
  }

  /// Explicit search action: emit now, cancel any pending change.
  pub fn submit(&self, text: impl Into<String>) {
    let _ = self.tx.send(RawInput::Submit(text.into()));
  }

  /// Clear affordance: an immediate blank query.
  pub fn clear(&self) {
    self.submit("");
  }
}

async fn run(
  mut rx: mpsc::UnboundedReceiver<RawInput>,
  out: mpsc::UnboundedSender<String>,
  debounce: Duration,
) {
  let mut pending: Option<String> = None;
  let mut last_emitted: Option<String> = None;

  let deadline = sleep_until(Instant::now());
  tokio::pin!(deadline);
  let mut armed = false;

  loop {
    tokio::select! {
      raw = rx.recv() => match raw {
        None => break,
        Some(RawInput::Changed(text)) => {
          // Latest value wins; the window restarts on every keystroke.
          pending = Some(text.unwrap_or_default());
          deadline.as_mut().reset(Instant::now() + debounce);
          armed = true;
        }
        Some(RawInput::Submit(query)) => {
          pending = None;
          armed = false;
          last_emitted = Some(query.clone());
          if out.send(query).is_err() {
            break;
          }
        }
      },
      _ = &mut deadline, if armed => {
        armed = false;
        if let Some(query) = pending.take() {
          if last_emitted.as_deref() != Some(query.as_str()) {
            last_emitted = Some(query.clone());
            if out.send(query).is_err() {
              break;
            }
          }
        }
      }
    }
  }
}
