//! Thread-affinity bridge.
//!
//! Native drivers must be called from threads attached to the native runtime,
//! and their calls block. A [`Bridge`] owns one worker thread, attached once
//! when it starts, and runs submitted jobs there in submission order. Async
//! callers await a [`Completion`] instead of blocking their executor.
//!
//! A job submitted from the worker thread itself runs inline; queueing it
//! would deadlock behind the job that submitted it.
//!
//! Dropping a [`Completion`] does not cancel its job. Once a job is queued it
//! runs to completion, so native state is never left half-mutated, and later
//! jobs observe its effects.

#![allow(clippy::result_large_err)]

use crate::context::Context;
use jdbcbridge_core::{Error, Result};
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context as TaskContext, Poll, Waker};
use std::thread::ThreadId;

type Job = Box<dyn FnOnce() + Send>;

static WORKER_SEQ: AtomicUsize = AtomicUsize::new(0);

/// A single worker thread attached to the native runtime.
pub struct Bridge {
    sender: mpsc::Sender<Job>,
    worker: ThreadId,
    name: String,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.name)
            .field("worker", &self.worker)
            .finish()
    }
}

impl Bridge {
    /// Spawn the worker thread and attach it to `ctx`'s runtime.
    pub fn start(ctx: Arc<Context>) -> Result<Self> {
        let name = format!(
            "jdbcbridge-worker-{}",
            WORKER_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                if let Err(e) = ctx.attach_current_thread() {
                    tracing::warn!(worker = %thread_name, error = %e, "bridge worker failed to attach");
                }
                tracing::debug!(worker = %thread_name, "bridge worker started");
                drop(ctx);
                while let Ok(job) = receiver.recv() {
                    job();
                }
                tracing::debug!(worker = %thread_name, "bridge worker stopped");
            })
            .map_err(Error::Io)?;
        Ok(Self {
            sender,
            worker: handle.thread().id(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_thread_id(&self) -> ThreadId {
        self.worker
    }

    pub fn is_worker_thread(&self) -> bool {
        std::thread::current().id() == self.worker
    }

    /// Run `job` on the worker; the returned future resolves with its result.
    pub fn run<T, F>(&self, job: F) -> Completion<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_worker_thread() {
            return Completion::ready(run_caught(job));
        }
        let (completion, completer) = Completion::pending();
        let queued: Job = Box::new(move || completer.complete(run_caught(job)));
        if self.sender.send(queued).is_err() {
            return Completion::ready(Err(stopped()));
        }
        completion
    }

    /// Run `job` on the worker and block the calling thread until it is done.
    pub fn run_blocking<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_worker_thread() {
            return run_caught(job);
        }
        let (tx, rx) = mpsc::sync_channel(1);
        let queued: Job = Box::new(move || {
            let _ = tx.send(run_caught(job));
        });
        self.sender.send(queued).map_err(|_| stopped())?;
        rx.recv().map_err(|_| stopped())?
    }
}

fn stopped() -> Error {
    Error::interface("bridge worker has stopped")
}

fn run_caught<T>(job: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(job)).map_err(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        Error::internal(format!("native call panicked: {}", detail))
    })
}

struct Slot<T> {
    value: Option<Result<T>>,
    waker: Option<Waker>,
}

struct Completer<T> {
    slot: Option<Arc<Mutex<Slot<T>>>>,
}

impl<T> Completer<T> {
    fn complete(mut self, value: Result<T>) {
        if let Some(slot) = self.slot.take() {
            fill(&slot, value);
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        // job dropped unrun: the worker went away with it still queued
        if let Some(slot) = self.slot.take() {
            fill(&slot, Err(stopped()));
        }
    }
}

fn fill<T>(slot: &Mutex<Slot<T>>, value: Result<T>) {
    let waker = {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.value = Some(value);
        slot.waker.take()
    };
    if let Some(waker) = waker {
        waker.wake();
    }
}

enum State<T> {
    Ready(Option<Result<T>>),
    Pending(Arc<Mutex<Slot<T>>>),
}

/// Result of a job submitted to a [`Bridge`].
#[must_use = "futures do nothing unless awaited"]
pub struct Completion<T> {
    state: State<T>,
}

// never pin-projected
impl<T> Unpin for Completion<T> {}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Ready(_) => "ready",
            State::Pending(_) => "pending",
        };
        f.debug_struct("Completion").field("state", &state).finish()
    }
}

impl<T> Completion<T> {
    fn ready(value: Result<T>) -> Self {
        Self {
            state: State::Ready(Some(value)),
        }
    }

    fn pending() -> (Self, Completer<T>) {
        let slot = Arc::new(Mutex::new(Slot {
            value: None,
            waker: None,
        }));
        (
            Self {
                state: State::Pending(Arc::clone(&slot)),
            },
            Completer { slot: Some(slot) },
        )
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            State::Ready(value) => match value.take() {
                Some(value) => Poll::Ready(value),
                None => Poll::Ready(Err(Error::interface("completion polled after ready"))),
            },
            State::Pending(slot) => {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                match slot.value.take() {
                    Some(value) => Poll::Ready(value),
                    None => {
                        slot.waker = Some(cx.waker().clone());
                        Poll::Pending
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use jdbcbridge_sqlite::SqliteRuntime;
    use std::time::Duration;

    fn bridge() -> (Arc<Context>, Bridge) {
        let ctx = Arc::new(Context::new(Arc::new(SqliteRuntime::new())));
        let bridge = Bridge::start(Arc::clone(&ctx)).unwrap();
        (ctx, bridge)
    }

    #[test]
    fn test_jobs_run_on_attached_worker() {
        let (ctx, bridge) = bridge();
        let worker = bridge.worker_thread_id();
        let check = Arc::clone(&ctx);
        let (id, attached) = bridge
            .run_blocking(move || {
                (std::thread::current().id(), check.is_current_thread_attached())
            })
            .unwrap();
        assert_eq!(id, worker);
        assert!(attached);
        assert_ne!(id, std::thread::current().id());
        assert!(!bridge.is_worker_thread());
        assert!(bridge.name().starts_with("jdbcbridge-worker-"));
    }

    #[test]
    fn test_jobs_run_in_submission_order() {
        let (_ctx, bridge) = bridge();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            let _ = bridge.run(move || {
                std::thread::sleep(Duration::from_millis(5 - i));
                log.lock().unwrap().push(i);
            });
        }
        bridge.run_blocking(|| ()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_completion_resolves_under_runtime() {
        let (_ctx, bridge) = bridge();
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let value = rt.block_on(async {
            bridge
                .run(|| {
                    std::thread::sleep(Duration::from_millis(20));
                    21 * 2
                })
                .await
        });
        assert_eq!(value.unwrap(), 42);
    }

    #[test]
    fn test_nested_submission_runs_inline() {
        let (_ctx, bridge) = bridge();
        let bridge = Arc::new(bridge);
        let inner = Arc::clone(&bridge);
        let nested = bridge
            .run_blocking(move || inner.run_blocking(|| std::thread::current().id()))
            .unwrap()
            .unwrap();
        assert_eq!(nested, bridge.worker_thread_id());
    }

    #[test]
    fn test_panicking_job_is_an_internal_error() {
        let (_ctx, bridge) = bridge();
        let err = bridge
            .run_blocking(|| -> i32 { panic!("driver blew up") })
            .unwrap_err();
        assert!(err.to_string().contains("driver blew up"));
        assert_eq!(bridge.run_blocking(|| 1).unwrap(), 1);
    }

    #[test]
    fn test_dropped_completion_still_runs() {
        let (_ctx, bridge) = bridge();
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        drop(bridge.run(move || {
            std::thread::sleep(Duration::from_millis(10));
            *flag.lock().unwrap() = true;
        }));
        bridge.run_blocking(|| ()).unwrap();
        assert!(*ran.lock().unwrap());
    }
}
