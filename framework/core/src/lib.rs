mod shutdown;
mod timeout;

pub mod prelude {
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
    pub use crate::timeout::TimeoutError;
}
