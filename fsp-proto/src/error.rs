use core::fmt;

/// Errors returned across the LIB/SVC API boundary, carried either as a negative near-end
/// return value or, for `RESET`, as an unsigned reason code on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
	/// Near end only: authorization error.
	Perm,
	/// Listener is out of connection socket space.
	NoEnt,
	/// Interrupted, e.g. `RESET`/Dispose while waiting on the control-block mutex.
	Intr,
	/// Near end only: I/O interface error between the message layer and the packet layer.
	Io,
	/// Near end only: message is too large to be processed.
	TooBig,
	/// Resuming or resurrecting didn't execute successfully; the socket is recycled.
	NoExec,
	/// Near end only: the given socket handle is invalid.
	BadF,
	/// Near end only: no memory.
	NoMem,
	/// Memory access out of border.
	Access,
	/// General fault.
	Fault,
	/// Near end only: the underlying socket is busy, new service request may not be accepted.
	Busy,
	/// Collision exists when making connection multiplication.
	Exist,
	/// Domain error: a parameter value is unacceptable.
	Dom,
}

impl Error {
	/// The POSIX errno this variant maps to, matching the comment table in the wire header
	/// this protocol was derived from.
	#[must_use]
	pub const fn to_errno(self) -> i32 {
		-match self {
			Self::Perm => libc_errno::EPERM,
			Self::NoEnt => libc_errno::ENOENT,
			Self::Intr => libc_errno::EINTR,
			Self::Io => libc_errno::EIO,
			Self::TooBig => libc_errno::E2BIG,
			Self::NoExec => libc_errno::ENOEXEC,
			Self::BadF => libc_errno::EBADF,
			Self::NoMem => libc_errno::ENOMEM,
			Self::Access => libc_errno::EACCES,
			Self::Fault => libc_errno::EFAULT,
			Self::Busy => libc_errno::EBUSY,
			Self::Exist => libc_errno::EEXIST,
			Self::Dom => libc_errno::EDOM,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let msg = match self {
			Self::Perm => "authorization error",
			Self::NoEnt => "listener out of connection socket space",
			Self::Intr => "interrupted waiting on the control block mutex",
			Self::Io => "I/O interface error between the message and packet layer",
			Self::TooBig => "message too large to be processed",
			Self::NoExec => "resuming or resurrecting failed, socket recycled",
			Self::BadF => "invalid socket handle",
			Self::NoMem => "no memory",
			Self::Access => "memory access out of border",
			Self::Fault => "general fault",
			Self::Busy => "underlying socket busy",
			Self::Exist => "collision making connection multiplication",
			Self::Dom => "parameter value unacceptable",
		};

		f.write_str(msg)
	}
}

impl std::error::Error for Error {}

/// The handful of raw errno values this crate needs, kept local rather than depending on
/// `libc` from a protocol-definition crate that otherwise has no syscall surface.
mod libc_errno {
	pub const EPERM: i32 = 1;
	pub const ENOENT: i32 = 2;
	pub const EINTR: i32 = 4;
	pub const EIO: i32 = 5;
	pub const E2BIG: i32 = 7;
	pub const ENOEXEC: i32 = 8;
	pub const EBADF: i32 = 9;
	pub const ENOMEM: i32 = 12;
	pub const EACCES: i32 = 13;
	pub const EFAULT: i32 = 14;
	pub const EBUSY: i32 = 16;
	pub const EEXIST: i32 = 17;
	pub const EDOM: i32 = 33;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn errno_values_are_negative_and_distinct() {
		let all = [
			Error::Perm,
			Error::NoEnt,
			Error::Intr,
			Error::Io,
			Error::TooBig,
			Error::NoExec,
			Error::BadF,
			Error::NoMem,
			Error::Access,
			Error::Fault,
			Error::Busy,
			Error::Exist,
			Error::Dom,
		];

		for e in all {
			assert!(e.to_errno() < 0);
		}

		assert_eq!(Error::Perm.to_errno(), -1);
		assert_eq!(Error::NoEnt.to_errno(), -2);
	}
}
