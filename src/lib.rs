//! Quasi-static plane stress relaxation of triangulated cross-sections.
//!
//! A [`Mesh`] of constant strain triangles is loaded with nodal forces and
//! boundary constraints, then relaxed node by node with a damped
//! [`GaussSeidel`] sweep until the largest nodal increment falls below the
//! convergence threshold. [`restore`] flattens a folded horizon onto a
//! target elevation while letting it slide horizontally.

pub mod builder;
pub mod datatypes;
pub mod element;
pub mod error;
pub mod input;
pub mod material;
pub mod mesh;
pub mod post_processor;
pub mod restore;
pub mod solver;

pub use builder::MeshBuilder;
pub use datatypes::{Contact, ExportResults, Node, Point2D, StepResult};
pub use element::Triangle;
pub use error::{DynelError, DynelResult};
pub use material::Material;
pub use mesh::Mesh;
pub use restore::restore;
pub use solver::{FramePacer, GaussSeidel, NoDelay, SleepPacer, SolverConfig, SolverState};
