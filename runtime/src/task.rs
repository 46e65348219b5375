use std::io;
use std::thread::{self, JoinHandle};

/// Spawns a named, joinable background thread.
///
/// Every datapath duty (interface read/write, destination dial/write, listener accept/handle, the
/// various fan-out and error-propagation loops) runs on one of these rather than behind an async
/// executor, since most of what they block on are raw syscalls (`recvmsg`, `sendto`, TCP
/// `read`/`write`/`connect`) that are cancelled by closing their underlying fd, not by awaiting.
pub fn spawn<F>(name: impl Into<String>, f: F) -> io::Result<JoinHandle<()>>
where
	F: FnOnce() + Send + 'static,
{
	thread::Builder::new().name(name.into()).spawn(f)
}
