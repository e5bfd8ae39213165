//! Shared-memory control-block mapping (`spec.md` §3, §9): a named POSIX shared-memory
//! object holding one `fsp_proto::control_block::ControlBlock<N, BLOCK>`, created by SVC at
//! session setup and opened read/write by LIB via the name handed over on the command
//! channel.
//!
//! Grounded on the `shm_open`/`ftruncate`/`mmap` sequence in
//! `examples/original_source/src/UnitTestFSP/LinuxSHM.cpp`; `libc` is reused directly
//! rather than reimplementing those syscalls since nothing in the teacher's own stack
//! touches POSIX shared memory.

use std::ffi::CString;
use std::marker::PhantomData;
use std::ptr;

use log::error;
use utils::error::*;

/// A mapped view of a shared-memory-backed `T`. The owning side (`create`) unlinks the
/// name on drop; the non-owning side (`open`) only unmaps.
pub struct SharedRegion<T> {
	ptr: *mut T,
	name: CString,
	owns_name: bool,
	_marker: PhantomData<T>,
}

// SAFETY: `T` itself is built out of atomics/interior-mutability types designed for
// cross-process sharing (`fsp_proto::control_block`); the region's ownership rules are
// enforced by the protocol, not by this wrapper.
unsafe impl<T: Sync> Sync for SharedRegion<T> {}
unsafe impl<T: Send> Send for SharedRegion<T> {}

fn shm_name(name: &str) -> Result<CString> {
	CString::new(format!("/{name}")).map_err(|_| error!("Shared memory name contains an interior NUL"))
}

impl<T: Default> SharedRegion<T> {
	/// Creates and zero-initializes a new shared-memory region sized for `T`. Fails with
	/// `EEXIST` semantics if a region of the same name is already mapped (`spec.md` §6).
	pub fn create(name: &str) -> Result<Self> {
		let cname = shm_name(name)?;
		let size = core::mem::size_of::<T>();

		// SAFETY: `cname` is a valid, NUL-terminated C string for the lifetime of the call.
		let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR | libc::O_CREAT | libc::O_EXCL, 0o600) };

		if fd < 0 {
			return Err(error!("shm_open(create) failed for {name}: {}", std::io::Error::last_os_error()));
		}

		// SAFETY: `fd` is a valid, just-opened file descriptor.
		if unsafe { libc::ftruncate(fd, size as libc::off_t) } < 0 {
			let err = error!("ftruncate failed for {name}: {}", std::io::Error::last_os_error());
			unsafe {
				libc::close(fd);
				libc::shm_unlink(cname.as_ptr());
			}
			return Err(err);
		}

		let ptr = map(fd, size)?;

		// SAFETY: the mapping is exactly `size_of::<T>()` bytes, freshly allocated (hence
		// writable), and not yet observed by any other process.
		unsafe { ptr::write(ptr, T::default()) };

		Ok(Self { ptr, name: cname, owns_name: true, _marker: PhantomData })
	}
}

impl<T> SharedRegion<T> {
	/// Opens an existing region created by `create`, without touching its contents.
	pub fn open(name: &str) -> Result<Self> {
		let cname = shm_name(name)?;
		let size = core::mem::size_of::<T>();

		// SAFETY: `cname` is a valid, NUL-terminated C string for the lifetime of the call.
		let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o600) };

		if fd < 0 {
			return Err(error!("shm_open(open) failed for {name}: {}", std::io::Error::last_os_error()));
		}

		let ptr = map(fd, size)?;

		Ok(Self { ptr, name: cname, owns_name: false, _marker: PhantomData })
	}

	#[must_use]
	pub fn get(&self) -> &T {
		// SAFETY: the pointer is valid for the region's lifetime and `T`'s internals
		// provide their own synchronization for cross-process access.
		unsafe { &*self.ptr }
	}
}

fn map<T>(fd: i32, size: usize) -> Result<*mut T> {
	// SAFETY: `fd` refers to a shared-memory object at least `size` bytes long.
	let addr = unsafe { libc::mmap(ptr::null_mut(), size, libc::PROT_READ | libc::PROT_WRITE, libc::MAP_SHARED, fd, 0) };

	// SAFETY: `fd` is no longer needed once mapped; the mapping keeps the object alive.
	unsafe { libc::close(fd) };

	if addr == libc::MAP_FAILED {
		return Err(error!("mmap failed: {}", std::io::Error::last_os_error()));
	}

	Ok(addr.cast())
}

impl<T> Drop for SharedRegion<T> {
	fn drop(&mut self) {
		// SAFETY: `ptr` was returned by a matching `mmap` of `size_of::<T>()` bytes.
		unsafe { libc::munmap(self.ptr.cast(), core::mem::size_of::<T>()) };

		if self.owns_name {
			// SAFETY: `name` is a valid, NUL-terminated C string.
			unsafe { libc::shm_unlink(self.name.as_ptr()) };
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;

	#[derive(Default)]
	struct Counter(AtomicU32);

	#[test]
	fn create_then_open_see_the_same_memory() {
		let name = format!("fsp-ipc-test-{}", std::process::id());

		let owner = SharedRegion::<Counter>::create(&name).expect("create");
		owner.get().0.store(42, Ordering::SeqCst);

		let opener = SharedRegion::<Counter>::open(&name).expect("open");
		assert_eq!(opener.get().0.load(Ordering::SeqCst), 42);
	}
}
