use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::shutdown::ShutdownHandle;

static SIGNALED_ONCE: AtomicBool = AtomicBool::new(false);

/// Installs a SIGINT/SIGTERM handler that triggers `shutdown` on the first signal received, and
/// exits the process with status 130 on a second.
pub fn install(shutdown: ShutdownHandle) -> Result<(), ctrlc::Error> {
	ctrlc::set_handler(move || {
		if SIGNALED_ONCE.swap(true, Ordering::SeqCst) {
			warn!("received a second interrupt signal, exiting immediately");
			process::exit(130);
		}

		info!("received interrupt signal, shutting down");
		shutdown.trigger();
	})
}
