use thiserror::Error;

/// Errors raised by mesh construction, boundary conditions, solver
/// configuration and the command line front end.
///
/// Numerically degenerate nodes or elements are not errors: they are skipped
/// for the step in which they occur.
#[derive(Debug, Error)]
pub enum DynelError {
    /// Element or node creation referenced unknown or duplicate ids.
    #[error("construction error: {0}")]
    Construction(String),

    /// Staged construction methods were called out of order.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A boundary condition or query named a node that does not exist.
    #[error("node {0} not found")]
    NodeNotFound(usize),

    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("post processor error: {0}")]
    PostProcessor(String),
}

pub type DynelResult<T> = Result<T, DynelError>;
