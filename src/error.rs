use crate::view_model::Phase;
use thiserror::Error;

/// Programmer errors in the use of cells and view models.
///
/// The infallible entry points (`set`, `update_model`, ...) panic with these; the `try_` variants
/// return them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("cell has been disposed")]
    Disposed,

    #[error("cannot {op} a view model that is {phase}")]
    Lifecycle { op: &'static str, phase: Phase },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
