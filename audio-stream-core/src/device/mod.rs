pub mod discovery;
pub mod resolve;

pub use discovery::discover;
pub use resolve::{find_device_by_name, resolve_stream_parameters};
