use nalgebra::{matrix, Matrix2, Matrix3, SMatrix, SVector, Vector2, Vector3};

use crate::{
    datatypes::{Node, Point2D},
    material::Material,
};

pub const DOF: usize = 2;

/// Out of plane thickness used for every plane stress element
pub const PART_THICKNESS: f64 = 1.0;

/// Constant strain triangle.
///
/// Area, shape function derivatives, the strain-displacement matrix and the
/// stiffness matrix are computed once from the vertex positions at creation
/// time (small displacement assumption). Strain, stress and internal forces
/// are recomputed from the live nodal displacements on every call.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub id: usize,
    nodes: [usize; 3],
    node_ids: [usize; 3],
    material: Material,
    area: f64,
    shape_derivatives: SMatrix<f64, 3, 2>,
    strain_displacement: SMatrix<f64, 3, 6>,
    stiffness: SMatrix<f64, 6, 6>,
}

impl Triangle {
    /// Builds an element over three arena nodes
    ///
    /// # Arguments
    /// * `id` - The caller assigned element id
    /// * `nodes` - Arena indices of the three vertices
    /// * `arena` - The node arena the indices point into
    /// * `material` - The element material
    pub(crate) fn new(id: usize, nodes: [usize; 3], arena: &[Node], material: Material) -> Triangle {
        let vertices = nodes.map(|i| arena[i].position);
        let node_ids = nodes.map(|i| arena[i].id);

        let signed_area = compute_signed_area(&vertices);
        let shape_derivatives = compute_shape_function_derivatives(&vertices, signed_area);
        let strain_displacement = compute_strain_displacement_matrix(&shape_derivatives);
        let area = signed_area.abs();
        let stiffness = compute_element_stiffness_matrix(
            &strain_displacement,
            material.stress_strain_matrix(),
            area,
            PART_THICKNESS,
        );

        Triangle {
            id,
            nodes,
            node_ids,
            material,
            area,
            shape_derivatives,
            strain_displacement,
            stiffness,
        }
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// Rows are [dNi/dx, dNi/dy] for the three vertices
    pub fn shape_function_derivatives(&self) -> &SMatrix<f64, 3, 2> {
        &self.shape_derivatives
    }

    pub fn strain_displacement_matrix(&self) -> &SMatrix<f64, 3, 6> {
        &self.strain_displacement
    }

    pub fn stiffness(&self) -> &SMatrix<f64, 6, 6> {
        &self.stiffness
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Arena indices of the vertices
    pub fn node_indices(&self) -> [usize; 3] {
        self.nodes
    }

    pub fn node_ids(&self) -> [usize; 3] {
        self.node_ids
    }

    /// Position of `node_index` within this element, if it is a vertex
    pub fn local_index(&self, node_index: usize) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node_index)
    }

    /// The 2x2 diagonal block of the stiffness matrix for one vertex
    pub fn nodal_stiffness_block(&self, local: usize) -> Matrix2<f64> {
        self.stiffness
            .fixed_view::<DOF, DOF>(local * DOF, local * DOF)
            .into_owned()
    }

    /// Gathers [u0, v0, u1, v1, u2, v2] from the cumulative displacements
    pub fn displacement_vector(&self, arena: &[Node]) -> SVector<f64, 6> {
        let [n0, n1, n2] = self.nodes.map(|i| arena[i].displacement);
        SVector::<f64, 6>::from([n0.x, n0.y, n1.x, n1.y, n2.x, n2.y])
    }

    /// Strain [εxx, εyy, γxy] for a given element displacement vector
    pub fn strain_from(&self, displacement: &SVector<f64, 6>) -> Vector3<f64> {
        self.strain_displacement * displacement
    }

    /// Stress [σxx, σyy, τxy] for a given strain
    pub fn stress_from(&self, strain: &Vector3<f64>) -> Vector3<f64> {
        self.material.stress_strain_matrix() * strain
    }

    pub fn strain(&self, arena: &[Node]) -> Vector3<f64> {
        self.strain_from(&self.displacement_vector(arena))
    }

    pub fn stress(&self, arena: &[Node]) -> Vector3<f64> {
        self.stress_from(&self.strain(arena))
    }

    /// Internal restoring force on each vertex, `-Bᵗσ·area·t`, keyed by
    /// node id.
    ///
    /// This opposes the current deformation, so adding it to the external
    /// load gives the out of balance force on the node.
    pub fn nodal_forces(&self, arena: &[Node]) -> [(usize, Point2D); 3] {
        let stress = self.stress(arena);
        let forces: SVector<f64, 6> =
            -(self.strain_displacement.transpose() * stress) * self.area * PART_THICKNESS;

        [0, 1, 2].map(|i| {
            (
                self.node_ids[i],
                Point2D::new(forces[DOF * i], forces[DOF * i + 1]),
            )
        })
    }

    /// Restoring force on the vertex at `local`, from its own columns of B
    pub(crate) fn nodal_force_at(&self, arena: &[Node], local: usize) -> Point2D {
        let stress = self.stress(arena);
        let block = self.strain_displacement.fixed_view::<3, DOF>(0, local * DOF);
        let force: Vector2<f64> = -(block.transpose() * stress) * self.area * PART_THICKNESS;

        Point2D::new(force[0], force[1])
    }
}

/// Calculates the signed area of a triangle. Positive for counter-clockwise
/// vertex order.
pub fn compute_signed_area(vertices: &[Point2D; 3]) -> f64 {
    let [v0, v1, v2] = vertices;
    0.5 * ((v1.x - v0.x) * (v2.y - v0.y) - (v2.x - v0.x) * (v1.y - v0.y))
}

/// Calculates the constant shape function gradients of a linear triangle
///
/// # Arguments
/// * `vertices` - The three vertex positions
/// * `signed_area` - The signed area of the triangle
///
/// # Returns
/// A 3x2 matrix, row i holding dNi/dx and dNi/dy
pub fn compute_shape_function_derivatives(
    vertices: &[Point2D; 3],
    signed_area: f64,
) -> SMatrix<f64, 3, 2> {
    let [v0, v1, v2] = vertices;

    let beta_1 = v1.y - v2.y;
    let beta_2 = v2.y - v0.y;
    let beta_3 = v0.y - v1.y;

    let gamma_1 = v2.x - v1.x;
    let gamma_2 = v0.x - v2.x;
    let gamma_3 = v1.x - v0.x;

    let mut derivatives: SMatrix<f64, 3, 2> = matrix![
        beta_1, gamma_1;
        beta_2, gamma_2;
        beta_3, gamma_3;
    ];

    derivatives /= 2.0 * signed_area;

    derivatives
}

/// Calculates the strain-displacement matrix of the element
///
/// # Arguments
/// * `derivatives` - The shape function derivatives
///
/// # Returns
/// A 3x6 strain-displacement matrix
pub fn compute_strain_displacement_matrix(derivatives: &SMatrix<f64, 3, 2>) -> SMatrix<f64, 3, 6> {
    let d = derivatives;

    matrix![
        d[(0, 0)], 0., d[(1, 0)], 0., d[(2, 0)], 0.;
        0., d[(0, 1)], 0., d[(1, 1)], 0., d[(2, 1)];
        d[(0, 1)], d[(0, 0)], d[(1, 1)], d[(1, 0)], d[(2, 1)], d[(2, 0)];
    ]
}

/// Computes the stiffness matrix for a given element
///
/// # Arguments
/// * `strain_displacement_mat` - The element B matrix
/// * `stress_strain_mat` - The material D matrix
/// * `element_area` - The area of the element
/// * `part_thickness` - The thickness of the part
///
/// # Returns
/// A 6x6 stiffness matrix for the element
pub fn compute_element_stiffness_matrix(
    strain_displacement_mat: &SMatrix<f64, 3, 6>,
    stress_strain_mat: &Matrix3<f64>,
    element_area: f64,
    part_thickness: f64,
) -> SMatrix<f64, 6, 6> {
    (strain_displacement_mat.transpose() * stress_strain_mat)
        * strain_displacement_mat
        * element_area
        * part_thickness
}

/// Maximum Coulomb shear stress of a plane stress state
///
/// # Arguments
/// * `stress` - [σxx, σyy, τxy]
/// * `friction_angle` - Internal friction angle in degrees
pub fn max_coulomb_shear_stress(stress: &Vector3<f64>, friction_angle: f64) -> f64 {
    let (sigma_xx, sigma_yy, tau_xy) = (stress[0], stress[1], stress[2]);
    let tan_phi = f64::tan(friction_angle.to_radians());

    let sigma_avg = (sigma_xx + sigma_yy) / 2.0;
    let radius = f64::sqrt(f64::powi((sigma_xx - sigma_yy) / 2.0, 2) + tau_xy * tau_xy);
    let sigma_max = sigma_avg + radius;
    let sigma_min = sigma_avg - radius;

    (sigma_max - sigma_min) / 2.0 * f64::sqrt(1.0 + tan_phi * tan_phi)
        - tan_phi * (sigma_max + sigma_min) / 2.0
}
