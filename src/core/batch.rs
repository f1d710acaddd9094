//! Runs one operation over a set of components concurrently.
//!
//! Every item is attempted; nothing short-circuits and nothing is retried. Events and
//! diagnostics raised on worker threads travel back over a channel and reach the caller's
//! reporter on the calling thread.

use std::sync::mpsc;
use std::thread;

use crate::error::{Error, Result};

use super::diagnostics::Diagnostic;
use super::events::Event;
use super::reporter::Reporter;

enum Message<R> {
    Event(Event),
    Diagnostic(Diagnostic),
    Done(Result<R>),
}

/// Handle workers use to surface progress while they run.
pub struct EventSink<R> {
    tx: mpsc::Sender<Message<R>>,
}

impl<R> EventSink<R> {
    /// Forward `event` to the caller's reporter.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(Message::Event(event));
    }

    /// Attach `diagnostic` to the batch report.
    pub fn diagnostic(&self, diagnostic: Diagnostic) {
        let _ = self.tx.send(Message::Diagnostic(diagnostic));
    }
}

/// Everything a batch produced, in completion order.
#[derive(Debug)]
pub struct BatchReport<R> {
    /// Results of the items whose operation succeeded.
    pub completed: Vec<R>,
    /// Every failure, one per failed item.
    pub failures: Vec<Error>,
    /// Diagnostics the workers raised, whether or not they failed.
    pub diagnostics: Vec<Diagnostic>,
}

impl<R> BatchReport<R> {
    /// True when no item failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply `op` to every item on its own worker thread and collect every outcome.
pub fn for_each_component<T, R, F>(
    items: &[T],
    reporter: &mut dyn Reporter,
    op: F,
) -> BatchReport<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T, &EventSink<R>) -> Result<R> + Sync,
{
    let (tx, rx) = mpsc::channel::<Message<R>>();
    let op = &op;

    thread::scope(|scope| {
        for item in items {
            let tx = tx.clone();
            scope.spawn(move || {
                let sink = EventSink { tx };
                let result = op(item, &sink);
                let _ = sink.tx.send(Message::Done(result));
            });
        }
        drop(tx);

        let mut report = BatchReport {
            completed: Vec::with_capacity(items.len()),
            failures: Vec::new(),
            diagnostics: Vec::new(),
        };
        for message in rx {
            match message {
                Message::Event(event) => reporter.report(event),
                Message::Diagnostic(diagnostic) => report.diagnostics.push(diagnostic),
                Message::Done(Ok(value)) => report.completed.push(value),
                Message::Done(Err(err)) => report.failures.push(err),
            }
        }
        report
    })
}
