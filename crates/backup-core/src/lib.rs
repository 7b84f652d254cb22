mod errors;
pub mod model;

pub use errors::{Classify, CoreError, ErrorClass, io_error_class};
pub use model::{Instance, InstanceId, NewInstance, NewSave, Save, SaveId, UnixMillis};

pub fn pkg_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
