use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{select, Receiver, Sender};
use segment::{SegmentSpec, SegmentWorker};

use crate::cli::Cli;
use crate::error::AppError;
use crate::listener::Listener;

/// Options the manager is constructed from; a plain struct rather than a builder/option-function
/// chain, since every field is known up front from parsed CLI args.
pub struct ManagerOptions {
	pub config_path: PathBuf,
	pub listen_address_override: Option<String>,
	pub listen_port: u16,
	pub reload: bool,
}

impl ManagerOptions {
	pub fn from_cli(cli: &Cli) -> Self {
		Self {
			config_path: PathBuf::from(&cli.config),
			listen_address_override: cli.listen_address.clone(),
			listen_port: cli.resolved_port(),
			reload: cli.reload,
		}
	}
}

/// Constructed exactly once, in `main`, wrapped in an `Arc` so the background threads it spawns
/// (error sink, config watch, listener accept loop) can each hold a cheap clone instead of a
/// borrow. Owns the config, the segment workers keyed by tunnel id, the shared listener, and the
/// process-wide shutdown token.
pub struct Manager {
	config_path: PathBuf,
	listen_addr: String,
	reload_enabled: bool,
	config: Mutex<config::Config>,
	workers: Mutex<HashMap<u16, SegmentWorker>>,
	listener: Listener,
	shutdown: runtime::Shutdown,
	errored: AtomicBool,
	err_tx: Sender<segment::SegmentError>,
	err_rx: Receiver<segment::SegmentError>,
	handles: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl Manager {
	pub fn new(options: ManagerOptions) -> Result<Self, AppError> {
		let config_path = options.config_path.canonicalize().unwrap_or(options.config_path.clone());

		let config = config::Config::load(&config_path)?;

		let listen_addr = resolve_listen_addr(&config, options.listen_address_override, options.listen_port);

		let listener = Listener::bind(&listen_addr)?;

		let (err_tx, err_rx) = crossbeam_channel::unbounded();

		let workers = build_workers(&config, listen_port(&listen_addr))?;

		Ok(Self {
			config_path,
			listen_addr,
			reload_enabled: options.reload,
			config: Mutex::new(config),
			workers: Mutex::new(workers),
			listener,
			shutdown: runtime::Shutdown::new(),
			errored: AtomicBool::new(false),
			err_tx,
			err_rx,
			handles: Mutex::new(Vec::new()),
		})
	}

	/// Binds every segment worker's interfaces, starts all workers, starts the listener's accept
	/// loop, and -- if enabled -- the config-watch thread. Does not block.
	pub fn start(self: &Arc<Self>) -> Result<(), AppError> {
		for worker in self.workers.lock().unwrap().values() {
			worker.bind()?;
			worker.run(self.err_tx.clone())?;
		}

		let mut handles = Vec::new();
		handles.push(self.spawn_error_sink()?);

		let relay_manager = Arc::clone(self);
		let relay = Arc::new(move |id: u16, msg: wire::Message| match relay_manager.workers.lock().unwrap().get(&id) {
			Some(worker) => worker.relay_inbound(&msg),
			None => log::warn!("no worker present for tunnel id {id}, dropping message"),
		});

		handles.push(self.listener.spawn_accept_loop(self.shutdown.rx(), relay)?);

		if self.reload_enabled {
			handles.push(self.spawn_config_watch()?);
		}

		self.handles.lock().unwrap().extend(handles);

		Ok(())
	}

	/// Runs [`Manager::start`] then blocks until shutdown is triggered (by signal, by a fatal
	/// error, or by a fatal reload failure), then tears everything down before returning.
	pub fn run(self: &Arc<Self>) -> Result<(), AppError> {
		self.start()?;
		let _ = self.shutdown.rx().channel().recv();
		self.shutdown();

		if self.errored.load(Ordering::SeqCst) {
			return Err(AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, "fatal runtime error, see logs")));
		}

		Ok(())
	}

	/// Runs [`Manager::start`] and returns immediately, leaving the caller free to wait on its own
	/// shutdown signal (e.g. a signal handler already installed by the caller). The caller is
	/// responsible for calling [`Manager::shutdown`] once it observes that signal.
	pub fn run_daemon(self: &Arc<Self>) -> Result<(), AppError> {
		self.start()
	}

	pub fn shutdown_handle(&self) -> runtime::ShutdownHandle {
		self.shutdown.handle()
	}

	pub fn errored(&self) -> bool {
		self.errored.load(Ordering::SeqCst)
	}

	/// Triggers the shutdown token, force-closes the listener and every segment worker's
	/// endpoints, and joins every background thread this manager spawned. Idempotent.
	pub fn shutdown(&self) {
		self.shutdown.trigger();
		self.listener.shutdown();

		for worker in self.workers.lock().unwrap().values() {
			worker.shutdown();
		}

		for handle in self.handles.lock().unwrap().drain(..) {
			let _ = handle.join();
		}
	}

	fn spawn_error_sink(self: &Arc<Self>) -> Result<std::thread::JoinHandle<()>, AppError> {
		let manager = Arc::clone(self);
		let err_rx = self.err_rx.clone();

		let handle = runtime::task::spawn("manager-error-sink", move || loop {
			match err_rx.recv() {
				Ok(err) => {
					log::error!("fatal error from segment worker: {err}");
					manager.errored.store(true, Ordering::SeqCst);
					manager.shutdown.trigger();
				}
				Err(_) => return,
			}
		})?;

		Ok(handle)
	}

	fn spawn_config_watch(self: &Arc<Self>) -> Result<std::thread::JoinHandle<()>, AppError> {
		let manager = Arc::clone(self);
		let watcher = config::watch(&self.config_path)?;
		let shutdown_rx = self.shutdown.rx();

		let handle = runtime::task::spawn("manager-config-watch", move || loop {
			select! {
				recv(shutdown_rx.channel()) -> _ => return,
				recv(watcher.events) -> event => match event {
					Ok(()) => manager.reload(),
					Err(_) => return,
				},
				recv(watcher.errors) -> err => match err {
					Ok(err) => {
						log::error!("config watch error, treating as fatal: {err}");
						manager.errored.store(true, Ordering::SeqCst);
						manager.shutdown.trigger();
						return;
					}
					Err(_) => return,
				},
			}
		})?;

		Ok(handle)
	}

	fn reload(&self) {
		log::info!("config change detected at {:?}, reloading", self.config_path);

		let new_config = match config::Config::load(&self.config_path) {
			Ok(c) => c,
			Err(err) => {
				log::error!("reload failed reading/parsing config: {err}");
				self.errored.store(true, Ordering::SeqCst);
				self.shutdown.trigger();
				return;
			}
		};

		{
			let current = self.config.lock().unwrap();
			if current.equivalent(&new_config) {
				log::info!("reloaded config is equivalent to the running one, nothing to do");
				return;
			}
		}

		log::info!("config changed, tearing down and rebuilding segment workers");

		for worker in self.workers.lock().unwrap().values() {
			worker.shutdown();
		}

		match build_workers(&new_config, listen_port(&self.listen_addr)) {
			Ok(new_workers) => {
				for worker in new_workers.values() {
					if let Err(err) = worker.bind().and_then(|_| worker.run(self.err_tx.clone()).map_err(AppError::from)) {
						log::error!("failed starting rebuilt segment worker: {err}");
						self.errored.store(true, Ordering::SeqCst);
						self.shutdown.trigger();
						return;
					}
				}

				*self.workers.lock().unwrap() = new_workers;
				*self.config.lock().unwrap() = new_config;
			}
			Err(err) => {
				log::error!("failed rebuilding segment workers after reload: {err}");
				self.errored.store(true, Ordering::SeqCst);
				self.shutdown.trigger();
			}
		}
	}
}

fn build_workers(config: &config::Config, port: u16) -> Result<HashMap<u16, SegmentWorker>, AppError> {
	let mut workers = HashMap::with_capacity(config.segments.len());

	for segment_config in &config.segments {
		let spec = SegmentSpec {
			id: segment_config.id,
			name: segment_config.name.clone(),
			interfaces: segment_config.interfaces.clone(),
			destinations: segment_config.destinations.clone(),
			blocking_fanout: segment_config.blocking_fanout,
		};

		let worker = SegmentWorker::new(spec, port)?;
		workers.insert(segment_config.id, worker);
	}

	Ok(workers)
}

fn resolve_listen_addr(config: &config::Config, address_override: Option<String>, port: u16) -> String {
	if let Some(addr) = address_override {
		return format!("{addr}:{port}");
	}

	if let Some(listen) = &config.listen {
		return listen.clone();
	}

	format!("{}:{}", config::DEFAULT_ADDRESS, port)
}

fn listen_port(addr: &str) -> u16 {
	addr.rsplit(':').next().and_then(|p| p.parse().ok()).unwrap_or(config::DEFAULT_PORT)
}

impl Drop for Manager {
	fn drop(&mut self) {
		self.shutdown.trigger();
		self.listener.shutdown();
		for worker in self.workers.lock().unwrap().values() {
			worker.shutdown();
		}
		for handle in self.handles.lock().unwrap().drain(..) {
			let _ = handle.join();
		}
	}
}
