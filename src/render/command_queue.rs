//! command_queue.rs
//! Message loop that marshals work from any thread onto the render-owning thread.
//!
//! - `post`: fire-and-forget.
//! - `send`: blocks until the owning thread ran the work (completion ordering).
//! - `interrupt`: the loop stops after draining what is already queued.
//!
//! Work receives `&mut C`, the owning thread's context, so render-owned state is
//! never shared. The queue is created on the owning thread; see
//! `render_loop::RenderThread::spawn` for the initialization handshake.

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, ThreadId},
    time::Duration,
};

use crate::error::{Error, Result};

/// How often a cancellable send re-checks its flag.
const CANCEL_POLL: Duration = Duration::from_millis(20);

type Job<C> = Box<dyn FnOnce(&mut C) + Send>;

enum Message<C> {
    Run(Job<C>),
    Interrupt,
}

struct QueueShared {
    closed: AtomicBool,
    owner: ThreadId,
}

/// Sending half; cheap to clone, usable from any thread.
pub struct CommandQueue<C> {
    tx: Sender<Message<C>>,
    shared: Arc<QueueShared>,
}

impl<C> Clone for CommandQueue<C> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), shared: self.shared.clone() }
    }
}

/// Owning half; lives on the thread that executes the work.
pub struct CommandLoop<C> {
    rx: Receiver<Message<C>>,
    interrupted: bool,
}

/// Create a queue owned by the calling thread.
pub fn channel<C>() -> (CommandQueue<C>, CommandLoop<C>) {
    let (tx, rx) = unbounded();
    let shared = Arc::new(QueueShared {
        closed: AtomicBool::new(false),
        owner: thread::current().id(),
    });
    (CommandQueue { tx, shared }, CommandLoop { rx, interrupted: false })
}

impl<C: 'static> CommandQueue<C> {
    pub fn post<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::QueueClosed);
        }
        self.tx.send(Message::Run(Box::new(work))).map_err(|_| Error::QueueClosed)
    }

    /// Enqueue and wait for completion. Returns `QueueClosed` if the work was
    /// dropped without running.
    pub fn send<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let done = self.enqueue_with_ack(work)?;
        done.recv().map_err(|_| Error::QueueClosed)
    }

    /// Like `send`, but stops waiting with `Cancelled` once `cancel` is raised.
    /// The work may still run later.
    pub fn send_cancellable<F>(&self, work: F, cancel: &AtomicBool) -> Result<()>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let done = self.enqueue_with_ack(work)?;
        loop {
            match done.recv_timeout(CANCEL_POLL) {
                Ok(()) => return Ok(()),
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.load(Ordering::Acquire) {
                        return Err(Error::Cancelled);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(Error::QueueClosed),
            }
        }
    }

    fn enqueue_with_ack<F>(&self, work: F) -> Result<Receiver<()>>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        if thread::current().id() == self.shared.owner {
            return Err(Error::SendFromOwner);
        }
        let (done_tx, done_rx) = bounded(1);
        self.post(move |ctx| {
            work(ctx);
            let _ = done_tx.send(());
        })?;
        Ok(done_rx)
    }

    /// Idempotent. Items queued before the first call still run.
    pub fn interrupt(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Message::Interrupt);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl<C> CommandLoop<C> {
    /// Run everything currently queued. `false` once interrupted.
    pub fn wait_idle(&mut self, ctx: &mut C) -> bool {
        while !self.interrupted {
            match self.rx.try_recv() {
                Ok(message) => {
                    if !self.dispatch(message, ctx) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => self.interrupted = true,
            }
        }
        false
    }

    /// Block for the next item and run it. `false` once interrupted.
    pub fn wait_next(&mut self, ctx: &mut C) -> bool {
        if self.interrupted {
            return false;
        }
        match self.rx.recv() {
            Ok(message) => self.dispatch(message, ctx),
            Err(_) => {
                self.interrupted = true;
                false
            }
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    fn dispatch(&mut self, message: Message<C>, ctx: &mut C) -> bool {
        match message {
            Message::Run(job) => {
                job(ctx);
                true
            }
            Message::Interrupt => {
                self.interrupted = true;
                false
            }
        }
    }
}
