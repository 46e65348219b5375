use std::io;
use std::mem;
use std::os::fd::RawFd;

/// Pre-byteswapped `ETH_P_ALL`, passed directly as the raw socket's protocol argument (the
/// kernel expects the protocol in network byte order at the syscall boundary).
const ETH_P_ALL_NET: libc::c_int = 768;

const PACKET_AUXDATA: libc::c_int = 8;
const TP_STATUS_VLAN_VALID: u32 = 0x10;

/// Maximum Ethernet frame size this endpoint reads/writes, matching the wire codec's max body
/// size -- a VLAN-reinjected frame can be up to 4 bytes larger than what was actually read off
/// the wire, so buffers that receive from [`recv_frame`] must reserve that headroom.
pub const MAX_FRAME_SIZE: usize = 65_500;

/// Mirrors the kernel's `struct tpacket_auxdata` (linux/if_packet.h) field-for-field, used only
/// to reinterpret the `PACKET_AUXDATA` control message payload.
#[repr(C)]
struct RawAuxdata {
	tp_status: u32,
	tp_len: u32,
	tp_snaplen: u32,
	tp_mac: u16,
	tp_net: u16,
	tp_vlan_tci: u16,
	tp_vlan_tpid: u16,
}

fn sockaddr_ll(ifindex: i32) -> libc::sockaddr_ll {
	let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
	addr.sll_family = libc::AF_PACKET as u16;
	addr.sll_protocol = (ETH_P_ALL_NET as u16).to_be();
	addr.sll_ifindex = ifindex;
	addr
}

/// Opens an `AF_PACKET`/`SOCK_RAW` socket, binds it to `ifindex`, and enables `PACKET_AUXDATA` so
/// VLAN tags stripped by the kernel arrive as control messages on every `recvmsg`.
pub fn open_bound(ifindex: i32) -> io::Result<RawFd> {
	let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, ETH_P_ALL_NET) };
	if fd < 0 {
		return Err(io::Error::last_os_error());
	}

	let addr = sockaddr_ll(ifindex);
	let bind_result = unsafe {
		libc::bind(
			fd,
			&addr as *const libc::sockaddr_ll as *const libc::sockaddr,
			mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
		)
	};
	if bind_result < 0 {
		let err = io::Error::last_os_error();
		unsafe { libc::close(fd) };
		return Err(err);
	}

	let enable: libc::c_int = 1;
	let setopt_result = unsafe {
		libc::setsockopt(
			fd,
			libc::SOL_PACKET,
			PACKET_AUXDATA,
			&enable as *const libc::c_int as *const libc::c_void,
			mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if setopt_result < 0 {
		let err = io::Error::last_os_error();
		unsafe { libc::close(fd) };
		return Err(err);
	}

	Ok(fd)
}

/// Receives one frame, splicing any stripped 802.1Q tag reported via `PACKET_AUXDATA` back into
/// the frame at byte offset 12. Returns the number of bytes written to `out`.
pub fn recv_frame(fd: RawFd, out: &mut [u8]) -> io::Result<usize> {
	let mut data = vec![0u8; MAX_FRAME_SIZE];
	let mut control = vec![0u8; 4096];

	let mut iov = libc::iovec { iov_base: data.as_mut_ptr() as *mut libc::c_void, iov_len: data.len() };

	let mut msg: libc::msghdr = unsafe { mem::zeroed() };
	msg.msg_iov = &mut iov;
	msg.msg_iovlen = 1;
	msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
	msg.msg_controllen = control.len();

	let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
	if n < 0 {
		return Err(io::Error::last_os_error());
	}
	let n = n as usize;

	let vlan_tag = unsafe { find_vlan_tag(&msg) };

	match vlan_tag {
		Some((tpid, tci)) if n >= 12 => {
			let spliced = n + 4;
			if out.len() < spliced {
				return Err(io::Error::new(io::ErrorKind::InvalidInput, "output buffer too small for reinjected VLAN tag"));
			}
			out[..12].copy_from_slice(&data[..12]);
			out[12..14].copy_from_slice(&tpid.to_be_bytes());
			out[14..16].copy_from_slice(&tci.to_be_bytes());
			out[16..spliced].copy_from_slice(&data[12..n]);
			Ok(spliced)
		}
		_ => {
			if out.len() < n {
				return Err(io::Error::new(io::ErrorKind::InvalidInput, "output buffer too small for received frame"));
			}
			out[..n].copy_from_slice(&data[..n]);
			Ok(n)
		}
	}
}

/// Scans the control message buffer for a `PACKET_AUXDATA` entry reporting a valid VLAN tag,
/// returning `(tpid, tci)` in host order.
unsafe fn find_vlan_tag(msg: &libc::msghdr) -> Option<(u16, u16)> {
	let mut cmsg = libc::CMSG_FIRSTHDR(msg);
	while !cmsg.is_null() {
		if (*cmsg).cmsg_level == libc::SOL_PACKET && (*cmsg).cmsg_type == PACKET_AUXDATA {
			let aux = &*(libc::CMSG_DATA(cmsg) as *const RawAuxdata);
			let vlan_valid = aux.tp_vlan_tci != 0 || aux.tp_status & TP_STATUS_VLAN_VALID != 0;
			if vlan_valid {
				let tpid = if aux.tp_vlan_tpid != 0 { aux.tp_vlan_tpid } else { 0x8100 };
				return Some((tpid, aux.tp_vlan_tci));
			}
		}
		cmsg = libc::CMSG_NXTHDR(msg as *const libc::msghdr as *mut libc::msghdr, cmsg);
	}
	None
}

/// Writes `data` (the frame body, not a wire header) to the interface via `sendto`.
pub fn send_frame(fd: RawFd, ifindex: i32, data: &[u8]) -> io::Result<usize> {
	let addr = sockaddr_ll(ifindex);
	let n = unsafe {
		libc::sendto(
			fd,
			data.as_ptr() as *const libc::c_void,
			data.len(),
			0,
			&addr as *const libc::sockaddr_ll as *const libc::sockaddr,
			mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
		)
	};
	if n < 0 {
		return Err(io::Error::last_os_error());
	}
	Ok(n as usize)
}

/// Unblocks any thread parked in `recvmsg`/`sendto` on `fd`, then closes it. Idempotent in the
/// sense that callers are expected to only ever close a given fd once (ownership is tracked by
/// the caller's `Option<RawFd>`), but harmless to call on an fd the kernel has already torn down.
pub fn shutdown_and_close(fd: RawFd) {
	unsafe {
		libc::shutdown(fd, libc::SHUT_RDWR);
		libc::close(fd);
	}
}
