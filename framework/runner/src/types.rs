/// Recommended error type for scenario definitions, setup hooks and step actions. It is compatible
/// with [crate::definition::HookResult] and [crate::step::ActionResult] so you can use `?` to
/// propagate errors.
pub type DrillResult<T> = anyhow::Result<T>;
