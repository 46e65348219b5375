use std::io::{self, Write};
use std::net::{Shutdown as NetShutdown, TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, select, Receiver, Sender};
use runtime::ShutdownRx;
use wire::Message;

/// Bound on a single dial attempt, so a worker shutdown is never stuck behind a stalled TCP
/// handshake for longer than this.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The maximum retry attempts in [`RetryPolicy::BoundedAttempts`]'s default configuration.
pub const MAX_SENDER_RETRIES: u32 = 60;

/// Upper bound on the backoff a segment worker waits between respawning a destination after it
/// exhausts its dial retries.
pub const MAX_RESCHEDULE_BACKOFF_SECS: u64 = 60;

/// How a [`DestinationEndpoint`] paces repeated dial attempts.
#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
	/// Attempt up to `max` times, sleeping `delay` between attempts.
	BoundedAttempts { max: u32, delay: Duration },
	/// Keep attempting until `Instant::now() > start + timeout`, sleeping `delay` between
	/// attempts. A zero `timeout` means no deadline: retry forever.
	BoundedDeadline { timeout: Duration, delay: Duration },
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy::BoundedAttempts { max: MAX_SENDER_RETRIES, delay: Duration::from_secs(1) }
	}
}

enum DialResult {
	Connected(TcpStream),
	ShuttingDown,
	Exhausted(io::Error),
}

enum WriteOutcome {
	ShutdownRequested,
	Error(io::Error),
}

/// Outcome of one full dial/write lifecycle.
///
/// Distinguishes a dial that never connected this cycle from a connection that was established
/// and later dropped, so the segment worker's reschedule backoff can tell them apart: per the
/// retry policy, a successful dial resets the backoff counter to zero even if the connection
/// later breaks, while a cycle that never connected at all should keep the counter climbing.
pub enum RunOutcome {
	ShuttingDown,
	DialExhausted(io::Error),
	Disconnected(io::Error),
}

/// One outbound TCP flow to a remote peer: dial with retry/backoff, then drain an outgoing
/// message queue onto the connection until it breaks or shutdown is requested.
pub struct DestinationEndpoint {
	name: String,
	port: u16,
	retry_policy: RetryPolicy,
	conn: Mutex<Option<TcpStream>>,
	write_tx: Sender<Message>,
	write_rx: Receiver<Message>,
}

impl DestinationEndpoint {
	pub fn new(name: impl Into<String>, port: u16, retry_policy: RetryPolicy) -> Self {
		// Unbuffered, matching the inherited codebase's unbuffered per-destination send channel.
		let (write_tx, write_rx) = crossbeam_channel::bounded(0);
		Self { name: name.into(), port, retry_policy, conn: Mutex::new(None), write_tx, write_rx }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// A clone-able handle to this endpoint's outbound queue.
	pub fn queue(&self) -> Sender<Message> {
		self.write_tx.clone()
	}

	/// Runs the full dial/write lifecycle until shutdown is requested or the dial retry budget is
	/// exhausted. A dial that never connects this cycle returns [`RunOutcome::DialExhausted`]; a
	/// connection that was established and later dropped returns [`RunOutcome::Disconnected`] --
	/// the caller uses this distinction to decide whether to reset its reschedule backoff.
	pub fn run(&self, shutdown: &ShutdownRx) -> RunOutcome {
		match self.dial(shutdown) {
			DialResult::ShuttingDown => RunOutcome::ShuttingDown,
			DialResult::Exhausted(err) => RunOutcome::DialExhausted(err),
			DialResult::Connected(stream) => {
				match stream.try_clone() {
					Ok(clone) => *self.conn.lock().unwrap() = Some(clone),
					Err(err) => log::warn!("failed duplicating connection handle to {:?}: {err}", self.name),
				}

				let outcome = self.write_loop(stream, shutdown);

				self.close();

				match outcome {
					WriteOutcome::ShutdownRequested => RunOutcome::ShuttingDown,
					WriteOutcome::Error(err) => RunOutcome::Disconnected(err),
				}
			}
		}
	}

	fn dial(&self, shutdown: &ShutdownRx) -> DialResult {
		let addr = format!("{}:{}", self.name, self.port);

		match self.retry_policy {
			RetryPolicy::BoundedAttempts { max, delay } => {
				let mut attempt = 0;
				loop {
					if shutdown.is_triggered() {
						return DialResult::ShuttingDown;
					}

					match self.connect_once(&addr) {
						Ok(stream) => return DialResult::Connected(stream),
						Err(err) => {
							attempt += 1;
							if attempt >= max {
								return DialResult::Exhausted(err);
							}
							log::info!("dial {addr:?} failed on attempt {attempt}, retrying: {err}");
							if self.sleep_or_shutdown(delay, shutdown) {
								return DialResult::ShuttingDown;
							}
						}
					}
				}
			}
			RetryPolicy::BoundedDeadline { timeout, delay } => {
				let start = Instant::now();
				let mut last_err = io::Error::new(io::ErrorKind::Other, "no dial attempt made");
				loop {
					if shutdown.is_triggered() {
						return DialResult::ShuttingDown;
					}

					if !timeout.is_zero() && Instant::now() > start + timeout {
						return DialResult::Exhausted(last_err);
					}

					match self.connect_once(&addr) {
						Ok(stream) => return DialResult::Connected(stream),
						Err(err) => {
							last_err = err;
							log::info!("dial {addr:?} failed, retrying within deadline: {last_err}");
							if self.sleep_or_shutdown(delay, shutdown) {
								return DialResult::ShuttingDown;
							}
						}
					}
				}
			}
		}
	}

	fn connect_once(&self, addr: &str) -> io::Result<TcpStream> {
		let resolved = addr
			.to_socket_addrs()?
			.next()
			.ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved"))?;
		TcpStream::connect_timeout(&resolved, CONNECT_TIMEOUT)
	}

	/// Sleeps for `delay`, waking early if shutdown fires. Returns `true` if it woke because of
	/// shutdown.
	fn sleep_or_shutdown(&self, delay: Duration, shutdown: &ShutdownRx) -> bool {
		let timer = after(delay);
		select! {
			recv(shutdown.channel()) -> _ => true,
			recv(timer) -> _ => false,
		}
	}

	fn write_loop(&self, mut stream: TcpStream, shutdown: &ShutdownRx) -> WriteOutcome {
		loop {
			select! {
				recv(shutdown.channel()) -> _ => return WriteOutcome::ShutdownRequested,
				recv(self.write_rx) -> msg => match msg {
					Ok(msg) => {
						if let Err(err) = stream.write_all(&msg.encode()) {
							return WriteOutcome::Error(err);
						}
					}
					Err(_) => return WriteOutcome::ShutdownRequested,
				},
			}
		}
	}

	fn close(&self) {
		if let Some(stream) = self.conn.lock().unwrap().take() {
			let _ = stream.shutdown(NetShutdown::Both);
		}
	}

	/// Forces the current connection (if any) closed, unblocking a write loop or a pending
	/// connect whose socket is already established.
	pub fn shutdown(&self) {
		self.close();
	}
}
