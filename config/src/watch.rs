use std::path::{Path, PathBuf};

use crossbeam_channel::{unbounded, Receiver};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::ConfigError;

/// A live filesystem watch on a config file.
///
/// The `RecommendedWatcher` is kept alive for as long as this value lives; dropping it stops the
/// watch. `events` fires once per detected change to the watched file, coalescing bursts is left
/// to the caller (a reload is idempotent, so firing twice for one edit is harmless).
pub struct ConfigWatcher {
	_watcher: RecommendedWatcher,
	pub events: Receiver<()>,
	pub errors: Receiver<notify::Error>,
}

/// Watches the parent directory of `path` and reports a reload signal whenever `path` itself is
/// modified or replaced.
///
/// The parent directory, not the file, is the watch target: many editors and config-management
/// tools save by writing a temp file and renaming it over the original, which some platforms
/// report as the original inode disappearing rather than as a write to it. Watching the
/// directory and filtering by path survives that.
pub fn watch(path: impl AsRef<Path>) -> Result<ConfigWatcher, ConfigError> {
	let path = path.as_ref();
	let canonical = path.canonicalize().map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
	let parent = canonical.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

	let (event_tx, events) = unbounded();
	let (error_tx, errors) = unbounded();

	let watched_path = canonical.clone();

	let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
		Ok(event) => {
			let is_relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_));
			if is_relevant && event.paths.iter().any(|p| p == &watched_path) {
				let _ = event_tx.send(());
			}
		}
		Err(err) => {
			let _ = error_tx.send(err);
		}
	})
	.map_err(ConfigError::Watch)?;

	watcher.watch(&parent, RecursiveMode::NonRecursive).map_err(ConfigError::Watch)?;

	Ok(ConfigWatcher { _watcher: watcher, events, errors })
}
