use std::io::Read;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use segment::{DestinationEndpoint, RetryPolicy, RunOutcome};

fn sender(s: &str) -> [u8; 10] {
	let mut out = [0u8; 10];
	out.copy_from_slice(s.as_bytes());
	out
}

#[test]
fn dials_and_writes_a_framed_message() {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();

	let accept_thread = thread::spawn(move || {
		let (mut stream, _) = listener.accept().unwrap();
		let mut buf = [0u8; 34];
		stream.read_exact(&mut buf).unwrap();
		buf
	});

	let endpoint =
		Arc::new(DestinationEndpoint::new("127.0.0.1", port, RetryPolicy::BoundedAttempts { max: 5, delay: Duration::from_millis(20) }));
	let queue = endpoint.queue();

	let shutdown = runtime::Shutdown::new();
	let rx = shutdown.rx();
	let run_endpoint = Arc::clone(&endpoint);
	let run_thread = thread::spawn(move || run_endpoint.run(&rx));

	let msg = wire::Message::new(7, sender("aaaaaaaaaa"), &b"hi"[..]).unwrap();
	queue.send(msg.clone()).unwrap();

	let received = accept_thread.join().unwrap();
	assert_eq!(&received[..], &msg.encode()[..]);

	shutdown.trigger();
	let outcome = run_thread.join().unwrap();
	assert!(matches!(outcome, RunOutcome::ShuttingDown));
}

#[test]
fn exhausts_retries_against_a_closed_port() {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();
	drop(listener);

	let endpoint =
		DestinationEndpoint::new("127.0.0.1", port, RetryPolicy::BoundedAttempts { max: 3, delay: Duration::from_millis(5) });

	let shutdown = runtime::Shutdown::new();
	let rx = shutdown.rx();

	let outcome = endpoint.run(&rx);
	assert!(matches!(outcome, RunOutcome::DialExhausted(_)));
}
