/// Returned by the executor when a step runs past its deadline.
///
/// Step code does not need to construct this itself. Work submitted through the step context is
/// bounded by the step deadline, and this error is what comes back when the deadline is hit. The
/// step executor looks for it in the error chain and records the step outcome as `timeout`.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct TimeoutError {
    msg: String,
}

impl Default for TimeoutError {
    fn default() -> Self {
        Self {
            msg: "Step deadline exceeded".to_string(),
        }
    }
}

impl TimeoutError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}
