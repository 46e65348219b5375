mod logger;
pub mod shutdown;
pub mod signal;
pub mod task;

pub use logger::Logger;
pub use shutdown::{Shutdown, ShutdownHandle, ShutdownRx};

/// Installs the process-wide logger. Call exactly once, from `main`.
pub fn init_logging(debug: bool) {
	log::set_max_level(if debug { log::LevelFilter::Debug } else { log::LevelFilter::Info });

	log::set_boxed_logger(Box::new(Logger)).expect("logger installed twice");
}
