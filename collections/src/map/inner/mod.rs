mod safe;

pub use safe::Core;
