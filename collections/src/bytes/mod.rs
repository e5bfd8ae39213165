mod bytes;
mod cursor;
mod rc;
mod slice;

pub use bytes::Bytes;
pub use cursor::Cursor;
pub use slice::Slice;
