use std::ops::{Add, AddAssign, Mul, Sub};

use serde::Serialize;

/// A point or vector in the section plane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const ZERO: Point2D = Point2D { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Point2D {
        Point2D { x, y }
    }

    pub fn norm(&self) -> f64 {
        f64::sqrt(self.x * self.x + self.y * self.y)
    }

    /// True when both components are exactly zero
    pub fn is_null(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2D {
    type Output = Point2D;

    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl AddAssign for Point2D {
    fn add_assign(&mut self, rhs: Point2D) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Mul<f64> for Point2D {
    type Output = Point2D;

    fn mul(self, rhs: f64) -> Point2D {
        Point2D::new(self.x * rhs, self.y * rhs)
    }
}

/// A mesh vertex and its solver state.
///
/// `elements` holds arena indices of the incident triangles. It is filled
/// when a triangle registers itself and never changes afterwards.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub position: Point2D,
    pub original_position: Point2D,
    /// External load. Accumulates until the solver is reset.
    pub force: Point2D,
    /// Cumulative displacement since the last solver start
    pub displacement: Point2D,
    pub fixed_x: bool,
    pub fixed_y: bool,
    pub(crate) elements: Vec<usize>,
}

impl Node {
    pub fn new(id: usize, x: f64, y: f64, fixed: bool) -> Node {
        Node {
            id,
            position: Point2D::new(x, y),
            original_position: Point2D::new(x, y),
            force: Point2D::ZERO,
            displacement: Point2D::ZERO,
            fixed_x: fixed,
            fixed_y: fixed,
            elements: Vec::new(),
        }
    }

    /// True when either axis is constrained
    pub fn is_fixed(&self) -> bool {
        self.fixed_x || self.fixed_y
    }

    pub fn is_fully_fixed(&self) -> bool {
        self.fixed_x && self.fixed_y
    }

    /// Arena indices of the incident elements
    pub fn elements(&self) -> &[usize] {
        &self.elements
    }
}

/// A penetration record between a slave node and a master segment
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub slave_node_id: usize,
    pub master_segment: [usize; 2],
    pub normal: Point2D,
    /// Signed gap. Negative values mean penetration.
    pub distance: f64,
}

/// Outcome of a single relaxation sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    pub converged: bool,
    pub iterations: usize,
    pub error: f64,
    pub running: bool,
    pub max_displacement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub fx: f64,
    pub fy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriangleRecord {
    pub id: usize,
    #[serde(rename = "nodeIds")]
    pub node_ids: [usize; 3],
    /// [σxx, σyy, τxy]
    pub stress: [f64; 3],
    /// [εxx, εyy, γxy]
    pub strain: [f64; 3],
}

/// Snapshot handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResults {
    pub nodes: Vec<NodeRecord>,
    pub triangles: Vec<TriangleRecord>,
}
