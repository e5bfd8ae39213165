//! Wire-format packet layouts, opcode/state enumerations, the ALFID type and the CRC-64
//! fallback checksum, plus the POSIX-style error taxonomy shared between the library and
//! service halves.

pub mod alfid;
pub mod config;
pub mod control_block;
pub mod crc64;
pub mod error;
pub mod opcode;
pub mod packet;
pub mod state;

pub use alfid::{Alfid, AlfidPair};
pub use config::Config;
pub use error::Error;
pub use opcode::OpCode;
pub use state::State;
