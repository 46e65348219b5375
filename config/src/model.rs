use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default TCP listen address for the shared listener, used when the config omits `listen` and
/// no CLI override is given.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
/// Default TCP listen port for the shared listener.
pub const DEFAULT_PORT: u16 = 4799;

/// The top-level configuration file: the shared listener address plus the set of segments to
/// bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub listen: Option<String>,
	#[serde(default)]
	pub segments: Vec<SegmentConfig>,
}

/// One segment: a tunnel id, the local interfaces it bridges, and the remote peers it dials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SegmentConfig {
	#[serde(default)]
	pub name: Option<String>,
	pub id: u16,
	#[serde(default)]
	pub interfaces: Vec<String>,
	#[serde(default)]
	pub destinations: Vec<String>,
	#[serde(default = "default_blocking_fanout")]
	pub blocking_fanout: bool,
}

fn default_blocking_fanout() -> bool {
	true
}

impl Config {
	/// Reads, parses, and validates the config file at `path`.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

		let config: Config =
			serde_yaml_ng::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

		config.validate()?;

		Ok(config)
	}

	/// Rejects configs with duplicate segment ids; the shared listener demultiplexes purely by
	/// id, so a duplicate would make routing ambiguous.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let mut seen = HashSet::with_capacity(self.segments.len());

		for segment in &self.segments {
			if !seen.insert(segment.id) {
				return Err(ConfigError::DuplicateId { id: segment.id });
			}
		}

		Ok(())
	}

	/// Whether `self` and `other` describe the same segments, independent of declaration order.
	/// The manager uses this to decide whether a reload actually needs to tear down and rebuild
	/// workers, or can be ignored as a no-op edit (a comment, reordering, whitespace).
	pub fn equivalent(&self, other: &Config) -> bool {
		if self.listen != other.listen || self.segments.len() != other.segments.len() {
			return false;
		}

		let mut ours: Vec<&SegmentConfig> = self.segments.iter().collect();
		let mut theirs: Vec<&SegmentConfig> = other.segments.iter().collect();
		ours.sort_by_key(|s| s.id);
		theirs.sort_by_key(|s| s.id);

		ours == theirs
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn segment(id: u16) -> SegmentConfig {
		SegmentConfig { name: None, id, interfaces: vec![], destinations: vec![], blocking_fanout: true }
	}

	#[test]
	fn duplicate_ids_are_rejected() {
		let config = Config { listen: None, segments: vec![segment(1), segment(1)] };
		let err = config.validate().unwrap_err();
		assert!(matches!(err, ConfigError::DuplicateId { id: 1 }));
	}

	#[test]
	fn unique_ids_validate() {
		let config = Config { listen: None, segments: vec![segment(1), segment(2)] };
		assert!(config.validate().is_ok());
	}

	#[test]
	fn equivalent_ignores_segment_order() {
		let a = Config { listen: None, segments: vec![segment(1), segment(2)] };
		let b = Config { listen: None, segments: vec![segment(2), segment(1)] };
		assert!(a.equivalent(&b));
	}

	#[test]
	fn equivalent_catches_a_changed_field() {
		let a = Config { listen: None, segments: vec![segment(1)] };
		let mut changed = segment(1);
		changed.interfaces.push("eth0".to_string());
		let b = Config { listen: None, segments: vec![changed] };
		assert!(!a.equivalent(&b));
	}

	#[test]
	fn blocking_fanout_defaults_true() {
		let config: Config = serde_yaml_ng::from_str(
			r#"
segments:
  - id: 1
    interfaces: [eth0]
    destinations: ["10.0.0.2:4799"]
"#,
		)
		.unwrap();

		assert!(config.segments[0].blocking_fanout);
	}

	#[test]
	fn blocking_fanout_can_be_disabled() {
		let config: Config = serde_yaml_ng::from_str(
			r#"
segments:
  - id: 1
    interfaces: [eth0]
    destinations: []
    blocking_fanout: false
"#,
		)
		.unwrap();

		assert!(!config.segments[0].blocking_fanout);
	}
}
