use std::io;
use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread::JoinHandle;

use runtime::ShutdownRx;
use wire::{Message, WireError};

/// The single daemon-wide TCP listener. Accepts connections and decodes framed messages off each,
/// handing every decoded message to a relay closure keyed by the message's tunnel id. Bound once
/// at manager start and never rebound across a config reload.
pub struct Listener {
	inner: TcpListener,
}

impl Listener {
	pub fn bind(addr: &str) -> io::Result<Self> {
		Ok(Self { inner: TcpListener::bind(addr)? })
	}

	pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
		self.inner.local_addr()
	}

	/// Spawns the accept loop on its own thread; each accepted connection gets its own handler
	/// thread decoding messages and calling `relay(id, msg)`.
	pub fn spawn_accept_loop<F>(&self, shutdown: ShutdownRx, relay: Arc<F>) -> io::Result<JoinHandle<()>>
	where
		F: Fn(u16, Message) + Send + Sync + 'static,
	{
		let listener = self.inner.try_clone()?;

		runtime::task::spawn("listener-accept", move || {
			for conn in listener.incoming() {
				if shutdown.is_triggered() {
					return;
				}

				match conn {
					Ok(stream) => {
						let relay = Arc::clone(&relay);
						let conn_shutdown = shutdown.clone();
						let spawned = runtime::task::spawn("listener-conn", move || handle_connection(stream, conn_shutdown, relay));
						if let Err(err) = spawned {
							log::warn!("failed spawning connection handler: {err}");
						}
					}
					Err(err) => {
						if shutdown.is_triggered() {
							return;
						}
						log::warn!("listener accept error: {err}");
						return;
					}
				}
			}
		})
	}

	/// Unblocks the accept loop's blocking `accept()` call. Does not close the fd outright; the
	/// `TcpListener`'s own `Drop` does that once the accept thread has exited.
	pub fn shutdown(&self) {
		unsafe {
			libc::shutdown(self.inner.as_raw_fd(), libc::SHUT_RDWR);
		}
	}
}

fn handle_connection<F>(mut stream: TcpStream, shutdown: ShutdownRx, relay: Arc<F>)
where
	F: Fn(u16, Message) + Send + Sync + 'static,
{
	log::info!("received new connection from {:?}", stream.peer_addr());

	loop {
		if shutdown.is_triggered() {
			return;
		}

		match Message::read_from(&mut stream) {
			Ok(msg) => relay(msg.header.id, msg),
			Err(WireError::Eof) => return,
			Err(err) => {
				log::warn!("connection read error, dropping connection: {err}");
				return;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;
	use std::time::Duration;

	use super::*;

	/// Demultiplexes two messages carrying different tunnel ids, both sent over the same
	/// connection, to the relay closure in the order they were written.
	#[test]
	fn demultiplexes_inbound_messages_by_tunnel_id() {
		let listener = Listener::bind("127.0.0.1:0").expect("bind listener");
		let addr = listener.local_addr().expect("local addr");

		let shutdown = runtime::Shutdown::new();
		let received: Arc<Mutex<Vec<(u16, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
		let received_for_relay = Arc::clone(&received);

		let relay = Arc::new(move |id: u16, msg: Message| {
			received_for_relay.lock().unwrap().push((id, msg.body.to_vec()));
		});

		let handle = listener.spawn_accept_loop(shutdown.rx(), relay).expect("spawn accept loop");

		let mut conn = TcpStream::connect(addr).expect("connect to listener");
		let sender = [b'a'; wire::SENDER_SIZE];
		Message::new(1, sender, &b"one"[..]).unwrap().write_to(&mut conn).unwrap();
		Message::new(2, sender, &b"two"[..]).unwrap().write_to(&mut conn).unwrap();

		let deadline = std::time::Instant::now() + Duration::from_secs(2);
		while received.lock().unwrap().len() < 2 && std::time::Instant::now() < deadline {
			std::thread::sleep(Duration::from_millis(10));
		}

		assert_eq!(*received.lock().unwrap(), vec![(1, b"one".to_vec()), (2, b"two".to_vec())]);

		drop(conn);
		shutdown.trigger();
		listener.shutdown();
		let _ = handle.join();
	}
}
