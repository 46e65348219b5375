use std::ffi::CStr;
use std::process::Command;

use crate::error::IfaceError;

/// Resolves `name` to a kernel interface index.
///
/// Tries a direct name lookup first. If that fails (the name is actually a kernel alias or
/// altname rather than the primary name), enumerates every interface and shells out to
/// `ip link show <ifname>` looking for an `alias` or `altname` entry that mentions `name`.
pub fn resolve_ifindex(name: &str) -> Result<i32, IfaceError> {
	if let Some(index) = if_nametoindex(name) {
		return Ok(index as i32);
	}

	log::info!("interface {name:?} not found by name, checking aliases/altnames");

	for candidate in list_interface_names()? {
		match Command::new("ip").args(["link", "show", &candidate]).output() {
			Ok(output) => {
				let combined = [output.stdout.as_slice(), output.stderr.as_slice()].concat();
				let text = String::from_utf8_lossy(&combined);
				if (text.contains("alias") || text.contains("altname")) && text.contains(name) {
					if let Some(index) = if_nametoindex(&candidate) {
						return Ok(index as i32);
					}
				}
			}
			Err(err) => {
				log::warn!("failed running 'ip link show {candidate}': {err}");
			}
		}
	}

	Err(IfaceError::NotFound { name: name.to_string() })
}

fn if_nametoindex(name: &str) -> Option<u32> {
	let c_name = std::ffi::CString::new(name).ok()?;
	let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
	if index == 0 {
		None
	} else {
		Some(index)
	}
}

fn list_interface_names() -> Result<Vec<String>, IfaceError> {
	let list = unsafe { libc::if_nameindex() };
	if list.is_null() {
		return Err(IfaceError::Io(std::io::Error::last_os_error()));
	}

	let mut names = Vec::new();
	let mut cursor = list;
	unsafe {
		while (*cursor).if_index != 0 {
			let name = CStr::from_ptr((*cursor).if_name).to_string_lossy().into_owned();
			names.push(name);
			cursor = cursor.add(1);
		}
		libc::if_freenameindex(list);
	}

	Ok(names)
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Loopback is always present and resolvable without `CAP_NET_RAW` -- `if_nametoindex` is an
	/// unprivileged query.
	#[test]
	fn resolves_loopback_by_name() {
		assert!(resolve_ifindex("lo").is_ok());
	}

	#[test]
	fn reports_not_found_for_a_bogus_name() {
		let err = resolve_ifindex("definitely-not-a-real-nic-0").unwrap_err();
		assert!(matches!(err, IfaceError::NotFound { .. }));
	}
}
