use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// A structured, one-shot broadcast cancellation signal.
///
/// Dropping every clone of the sender side wakes every clone of the receiver side at once. This
/// replaces the boolean-channel-plus-polling teardown pattern with a single event that
/// `crossbeam_channel::select!` can wait on alongside a task's ordinary work, and that a thread
/// blocked in a syscall can be kicked out of by having its fd closed from the side that triggered
/// shutdown.
pub struct Shutdown {
	tx: Arc<Mutex<Option<Sender<Infallible>>>>,
	rx: Receiver<Infallible>,
}

impl Shutdown {
	pub fn new() -> Self {
		let (tx, rx) = bounded(0);
		Self { tx: Arc::new(Mutex::new(Some(tx))), rx }
	}

	/// A cloneable receiver that a spawned task holds to observe the signal.
	pub fn rx(&self) -> ShutdownRx {
		ShutdownRx(self.rx.clone())
	}

	/// A cloneable, `'static` handle that can trigger shutdown from any thread (a signal handler,
	/// the error sink, ...), independent of this `Shutdown`'s own lifetime.
	pub fn handle(&self) -> ShutdownHandle {
		ShutdownHandle(self.tx.clone())
	}

	/// Triggers the shutdown signal. Idempotent.
	pub fn trigger(&self) {
		self.handle().trigger();
	}
}

impl Default for Shutdown {
	fn default() -> Self {
		Self::new()
	}
}

/// A handle that can trigger a [`Shutdown`] from any thread.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<Mutex<Option<Sender<Infallible>>>>);

impl ShutdownHandle {
	pub fn trigger(&self) {
		self.0.lock().unwrap().take();
	}
}

/// A cloneable receiver side of a [`Shutdown`] signal.
#[derive(Clone)]
pub struct ShutdownRx(Receiver<Infallible>);

impl ShutdownRx {
	/// Non-blocking check for whether shutdown has been triggered.
	pub fn is_triggered(&self) -> bool {
		matches!(self.0.try_recv(), Err(TryRecvError::Disconnected))
	}

	/// The underlying channel, for use in a `crossbeam_channel::select!` alongside other work.
	pub fn channel(&self) -> &Receiver<Infallible> {
		&self.0
	}
}
