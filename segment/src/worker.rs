use std::io;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use iface::InterfaceEndpoint;
use runtime::{Shutdown, ShutdownRx};
use wire::Message;

use crate::destination::{DestinationEndpoint, RetryPolicy, RunOutcome, MAX_RESCHEDULE_BACKOFF_SECS};
use crate::error::SegmentError;

/// Everything needed to construct a [`SegmentWorker`] for one tunnel id.
pub struct SegmentSpec {
	pub id: u16,
	pub name: Option<String>,
	pub interfaces: Vec<String>,
	pub destinations: Vec<String>,
	pub blocking_fanout: bool,
}

/// Composes the interface and destination endpoints for a single tunnel id, fanning frames from
/// any interface out to every destination and fanning inbound messages back to every interface
/// except the one that originated them.
pub struct SegmentWorker {
	id: u16,
	name: String,
	interfaces: Vec<InterfaceEndpoint>,
	destinations: Vec<Arc<DestinationEndpoint>>,
	blocking_fanout: bool,
	shutdown: Shutdown,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SegmentWorker {
	pub fn new(spec: SegmentSpec, port: u16) -> Result<Self, SegmentError> {
		let name = spec.name.clone().unwrap_or_else(|| spec.id.to_string());

		let mut interfaces = Vec::with_capacity(spec.interfaces.len());
		for ifname in &spec.interfaces {
			let endpoint = InterfaceEndpoint::new(spec.id, &name, ifname)
				.map_err(|source| SegmentError::Bind { segment_id: spec.id, interface: ifname.clone(), source })?;
			interfaces.push(endpoint);
		}

		let destinations = spec
			.destinations
			.iter()
			.map(|dest| Arc::new(DestinationEndpoint::new(dest.clone(), port, RetryPolicy::default())))
			.collect();

		Ok(Self {
			id: spec.id,
			name,
			interfaces,
			destinations,
			blocking_fanout: spec.blocking_fanout,
			shutdown: Shutdown::new(),
			handles: Mutex::new(Vec::new()),
		})
	}

	pub fn id(&self) -> u16 {
		self.id
	}

	/// Opens and binds every interface endpoint's raw socket. Destination sockets are not opened
	/// here; dialing happens once [`SegmentWorker::run`] spawns each destination's thread.
	pub fn bind(&self) -> Result<(), SegmentError> {
		for endpoint in &self.interfaces {
			endpoint.bind().map_err(|source| SegmentError::Bind {
				segment_id: self.id,
				interface: endpoint.name().to_string(),
				source,
			})?;
		}
		Ok(())
	}

	/// Starts every interface read/write loop and every destination's dial/write supervisor,
	/// forwarding errors on `err_tx`.
	pub fn run(&self, err_tx: Sender<SegmentError>) -> io::Result<()> {
		let mut handles = Vec::new();

		let (fanout_tx, fanout_rx) = crossbeam_channel::unbounded::<Message>();
		let (iface_err_tx, iface_err_rx) = crossbeam_channel::unbounded();

		for endpoint in &self.interfaces {
			handles.push(endpoint.spawn_read(fanout_tx.clone(), iface_err_tx.clone())?);
			handles.push(endpoint.spawn_write(self.shutdown.rx(), iface_err_tx.clone())?);
		}

		{
			let segment_id = self.id;
			let err_tx = err_tx.clone();
			let shutdown_rx = self.shutdown.rx();
			handles.push(runtime::task::spawn(format!("segment-{segment_id}-iface-errs"), move || loop {
				match iface_err_rx.recv() {
					Ok(err) => {
						// Shutdown closes every interface fd to unblock recvmsg/sendto, which surfaces
						// here as an ordinary read/write error. Don't treat it as fatal.
						if shutdown_rx.is_triggered() {
							log::info!("segment {segment_id}: interface error during shutdown, ignoring: {err}");
							continue;
						}
						let _ = err_tx.send(SegmentError::Connectivity {
							segment_id,
							destination: "<interface>".to_string(),
							source: io::Error::new(io::ErrorKind::Other, err.to_string()),
						});
					}
					Err(_) => return,
				}
			})?);
		}

		{
			let destination_queues: Vec<Sender<Message>> = self.destinations.iter().map(|d| d.queue()).collect();
			let blocking = self.blocking_fanout;
			let shutdown_rx = self.shutdown.rx();
			let segment_id = self.id;
			handles.push(runtime::task::spawn(format!("segment-{segment_id}-fanout"), move || {
				fanout_loop(fanout_rx, destination_queues, blocking, shutdown_rx);
			})?);
		}

		for destination in &self.destinations {
			let segment_id = self.id;
			let name = destination.name().to_string();
			let shutdown_rx = self.shutdown.rx();
			let err_tx = err_tx.clone();
			let destination = Arc::clone(destination);

			handles.push(runtime::task::spawn(format!("segment-{segment_id}-dest-{name}"), move || {
				let mut retry_counter: u64 = 0;
				loop {
					if shutdown_rx.is_triggered() {
						return;
					}

					match destination.run(&shutdown_rx) {
						RunOutcome::ShuttingDown => return,
						RunOutcome::DialExhausted(err) => {
							// Retry is always active for a destination, so this is never forwarded to the
							// manager's fatal error sink -- the worker just reschedules the dial itself.
							log::warn!("segment {segment_id}: destination {name:?} exhausted dial retries: {err}");

							if shutdown_rx.is_triggered() {
								return;
							}

							let backoff = Duration::from_secs(retry_counter.min(MAX_RESCHEDULE_BACKOFF_SECS));
							log::info!("segment {segment_id}: rescheduling destination {name:?} in {backoff:?}");
							select! {
								recv(shutdown_rx.channel()) -> _ => return,
								default(backoff) => {},
							}
							retry_counter += 1;
						}
						RunOutcome::Disconnected(err) => {
							log::warn!("segment {segment_id}: destination {name:?} dropped: {err}");

							if shutdown_rx.is_triggered() {
								return;
							}

							// A dial did succeed this cycle, so the backoff starts over at 0s.
							retry_counter = 0;
							log::info!("segment {segment_id}: rescheduling destination {name:?} immediately after disconnect");
						}
					}
				}
			})?);
		}

		*self.handles.lock().unwrap() = handles;
		Ok(())
	}

	/// Delivers an inbound message (from the shared listener) to every interface whose sender tag
	/// does not match the message's own -- the sole loop-prevention mechanism.
	pub fn relay_inbound(&self, msg: &Message) {
		let recipients = self.interfaces.iter().map(|endpoint| (endpoint.sender(), endpoint.queue()));
		relay_to(msg, recipients);
	}

	/// Triggers this segment's shutdown token, force-closes every endpoint's socket/connection to
	/// unblock any thread parked in a blocking syscall, and joins every spawned thread.
	pub fn shutdown(&self) {
		self.shutdown.trigger();

		for endpoint in &self.interfaces {
			endpoint.shutdown();
		}
		for destination in &self.destinations {
			destination.shutdown();
		}

		for handle in self.handles.lock().unwrap().drain(..) {
			let _ = handle.join();
		}
	}
}

/// Sends `msg` to every recipient queue whose sender tag doesn't match `msg`'s own. Split out of
/// [`SegmentWorker::relay_inbound`] so the loop-prevention rule can be tested against fake queues
/// without a real bound interface.
fn relay_to(msg: &Message, recipients: impl Iterator<Item = ([u8; wire::SENDER_SIZE], Sender<Message>)>) {
	for (sender, queue) in recipients {
		if sender != msg.header.sender {
			let _ = queue.send(msg.clone());
		}
	}
}

fn fanout_loop(fanout_rx: Receiver<Message>, destinations: Vec<Sender<Message>>, blocking: bool, shutdown: ShutdownRx) {
	loop {
		select! {
			recv(shutdown.channel()) -> _ => return,
			recv(fanout_rx) -> msg => match msg {
				Ok(msg) => {
					for dest_tx in &destinations {
						if blocking {
							select! {
								send(dest_tx, msg.clone()) -> _ => {},
								recv(shutdown.channel()) -> _ => return,
							}
						} else if dest_tx.try_send(msg.clone()).is_err() {
							log::warn!("dropping message: no consumer listening on destination queue");
						}
					}
				}
				Err(_) => return,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::thread;
	use std::time::Duration;

	use super::*;

	fn sender(tag: u8) -> [u8; wire::SENDER_SIZE] {
		[tag; wire::SENDER_SIZE]
	}

	fn msg_from(tag: u8) -> Message {
		Message::new(1, sender(tag), &b"frame"[..]).unwrap()
	}

	/// A message reaches every fake queue whose sender tag differs from its own, and never the
	/// queue whose tag matches -- the loop-prevention rule `relay_inbound` exists for.
	#[test]
	fn relay_to_skips_the_originating_sender_and_reaches_the_rest() {
		let (origin_tx, origin_rx) = crossbeam_channel::unbounded();
		let (other_a_tx, other_a_rx) = crossbeam_channel::unbounded();
		let (other_b_tx, other_b_rx) = crossbeam_channel::unbounded();

		let msg = msg_from(1);
		let recipients = vec![(sender(1), origin_tx), (sender(2), other_a_tx), (sender(3), other_b_tx)].into_iter();

		relay_to(&msg, recipients);

		assert!(origin_rx.try_recv().is_err(), "message must not be relayed back to its own sender");
		assert_eq!(other_a_rx.try_recv().unwrap().header.sender, sender(1));
		assert_eq!(other_b_rx.try_recv().unwrap().header.sender, sender(1));
	}

	/// A message with no recipient sharing its sender tag reaches every one of them.
	#[test]
	fn relay_to_reaches_every_distinct_sender() {
		let (a_tx, a_rx) = crossbeam_channel::unbounded();
		let (b_tx, b_rx) = crossbeam_channel::unbounded();

		let msg = msg_from(9);
		let recipients = vec![(sender(1), a_tx), (sender(2), b_tx)].into_iter();

		relay_to(&msg, recipients);

		assert!(a_rx.try_recv().is_ok());
		assert!(b_rx.try_recv().is_ok());
	}

	/// One message read off an interface reaches every destination queue exactly once.
	#[test]
	fn fanout_loop_delivers_to_every_destination_once() {
		let (fanout_tx, fanout_rx) = crossbeam_channel::unbounded();
		let (dest_a_tx, dest_a_rx) = crossbeam_channel::unbounded();
		let (dest_b_tx, dest_b_rx) = crossbeam_channel::unbounded();

		let shutdown = Shutdown::new();
		let shutdown_rx = shutdown.rx();

		let handle = thread::spawn(move || fanout_loop(fanout_rx, vec![dest_a_tx, dest_b_tx], true, shutdown_rx));

		fanout_tx.send(msg_from(5)).unwrap();

		let a = dest_a_rx.recv_timeout(Duration::from_secs(2)).expect("destination a should receive the message");
		let b = dest_b_rx.recv_timeout(Duration::from_secs(2)).expect("destination b should receive the message");
		assert_eq!(a.header.sender, sender(5));
		assert_eq!(b.header.sender, sender(5));
		assert!(dest_a_rx.try_recv().is_err(), "destination a must receive the message exactly once");

		drop(fanout_tx);
		shutdown.trigger();
		handle.join().unwrap();
	}

	/// Under `blocking_fanout: false`, a destination queue with no consumer drops the message
	/// instead of blocking the fan-out loop.
	#[test]
	fn fanout_loop_drops_on_full_queue_when_not_blocking() {
		let (fanout_tx, fanout_rx) = crossbeam_channel::unbounded();
		let (dest_tx, _dest_rx) = crossbeam_channel::bounded(0);

		let shutdown = Shutdown::new();
		let shutdown_rx = shutdown.rx();

		let handle = thread::spawn(move || fanout_loop(fanout_rx, vec![dest_tx], false, shutdown_rx));

		fanout_tx.send(msg_from(5)).unwrap();
		drop(fanout_tx);
		shutdown.trigger();
		handle.join().unwrap();
	}
}
