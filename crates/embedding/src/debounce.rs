//! Generic coalescer turning many concurrent single-item calls into one
//! batched handler invocation.
//!
//! The first task to arrive while no window is open starts the debounce
//! timer; everything submitted before it fires is swapped out and handed to
//! the handler as one batch. Each caller gets its result back through its
//! own one-shot channel, so it resumes on its own scheduler rather than the
//! one that fired the timer.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Handler<T, U> = dyn Fn(Vec<T>) -> BoxFuture<'static, Vec<U>> + Send + Sync;

struct Pending<T, U> {
  tasks: Vec<T>,
  waiters: Vec<oneshot::Sender<U>>,
  window_open: bool,
}

impl<T, U> Default for Pending<T, U> {
  fn default() -> Self {
    Self {
      tasks: Vec::new(),
      waiters: Vec::new(),
      window_open: false,
    }
  }
}

pub struct BatchDebouncePool<T, U> {
  debounce: Duration,
  handler: Arc<Handler<T, U>>,
  state: Arc<Mutex<Pending<T, U>>>,
}

impl<T, U> BatchDebouncePool<T, U>
where
  T: Send + 'static,
  U: Default + Send + 'static,
{
  /// `handler` receives the batched inputs and must return one output per
  /// input, in order. A short result (or the handler reporting fewer
  /// outputs than inputs) resolves every waiter of that batch to
  /// `U::default()` instead of delivering partially.
  pub fn new<H, F>(debounce: Duration, handler: H) -> Self
  where
    H: Fn(Vec<T>) -> F + Send + Sync + 'static,
    F: Future<Output = Vec<U>> + Send + 'static,
  {
    Self {
      debounce,
      handler: Arc::new(move |tasks| -> BoxFuture<'static, Vec<U>> { Box::pin(handler(tasks)) }),
      state: Arc::new(Mutex::new(Pending::default())),
    }
  }

  /// Submit one task and wait for its slice of the next batch's result.
  ///
  /// Dropping the returned future leaves the slot in the batch; its result
  /// is discarded when the batch completes. A handler may call `add_task`
  /// itself: the nested task lands in a later batch, never its own.
  pub async fn add_task(&self, task: T) -> U {
    let (tx, rx) = oneshot::channel();

    let opens_window = {
      let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
      state.tasks.push(task);
      state.waiters.push(tx);
      if state.window_open {
        false
      } else {
        state.window_open = true;
        true
      }
    };

    if opens_window {
      debug!(debounce_ms = self.debounce.as_millis() as u64, "debounce window opened");
      let state = Arc::clone(&self.state);
      let handler = Arc::clone(&self.handler);
      let debounce = self.debounce;
      // The flush must fire even if the opening caller is dropped.
      tokio::spawn(async move {
        tokio::time::sleep(debounce).await;
        let (tasks, waiters) = {
          let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
          state.window_open = false;
          (std::mem::take(&mut state.tasks), std::mem::take(&mut state.waiters))
        };
        debug!(tasks = tasks.len(), "debounce window closed, dispatching batch");

        let expected = waiters.len();
        let results = handler(tasks).await;
        if results.len() == expected {
          for (waiter, result) in waiters.into_iter().zip(results) {
            let _ = waiter.send(result);
          }
        } else {
          warn!(expected, got = results.len(), "batch handler returned wrong arity");
          for waiter in waiters {
            let _ = waiter.send(U::default());
          }
        }
      });
    }

    rx.await.unwrap_or_default()
  }

  /// Tasks currently waiting for a window to close.
  pub fn pending_len(&self) -> usize {
    self.state.lock().unwrap_or_else(|e| e.into_inner()).tasks.len()
  }
}
