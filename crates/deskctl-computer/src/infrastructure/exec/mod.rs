//! Exec backend: xdotool inside a container.

pub mod computer;
pub mod runner;

pub use computer::ExecBackedComputer;
pub use runner::{CommandRunner, ExecError, TokioCommandRunner, DEFAULT_EXEC_TIMEOUT};
