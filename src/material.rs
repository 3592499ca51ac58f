use nalgebra::{matrix, Matrix3};

use crate::error::{DynelError, DynelResult};

/// Linear elastic material under plane stress.
///
/// The constitutive matrix is rebuilt whenever the modulus or the poisson
/// ratio changes. Density is carried along but does not enter the solve.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    youngs_modulus: f64,
    poisson_ratio: f64,
    density: f64,
    stress_strain: Matrix3<f64>,
}

impl Material {
    /// Creates a material
    ///
    /// # Arguments
    /// * `youngs_modulus` - The modulus of elasticity. Must be positive.
    /// * `poisson_ratio` - The poisson ratio. Values near ±1 are not guarded.
    /// * `density` - Reserved, has no effect on the solver
    pub fn new(youngs_modulus: f64, poisson_ratio: f64, density: f64) -> DynelResult<Material> {
        check_modulus(youngs_modulus)?;

        Ok(Material {
            youngs_modulus,
            poisson_ratio,
            density,
            stress_strain: compute_stress_strain_matrix(poisson_ratio, youngs_modulus),
        })
    }

    pub fn youngs_modulus(&self) -> f64 {
        self.youngs_modulus
    }

    pub fn poisson_ratio(&self) -> f64 {
        self.poisson_ratio
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    /// The plane stress constitutive matrix D
    pub fn stress_strain_matrix(&self) -> &Matrix3<f64> {
        &self.stress_strain
    }

    pub fn set_youngs_modulus(&mut self, youngs_modulus: f64) -> DynelResult<()> {
        check_modulus(youngs_modulus)?;
        self.youngs_modulus = youngs_modulus;
        self.stress_strain = compute_stress_strain_matrix(self.poisson_ratio, youngs_modulus);
        Ok(())
    }

    pub fn set_poisson_ratio(&mut self, poisson_ratio: f64) {
        self.poisson_ratio = poisson_ratio;
        self.stress_strain = compute_stress_strain_matrix(poisson_ratio, self.youngs_modulus);
    }

    pub fn set_density(&mut self, density: f64) {
        self.density = density;
    }
}

fn check_modulus(youngs_modulus: f64) -> DynelResult<()> {
    if !(youngs_modulus.is_finite() && youngs_modulus > 0.0) {
        return Err(DynelError::InvalidMaterial(format!(
            "young's modulus must be positive, got {youngs_modulus}"
        )));
    }
    Ok(())
}

/// Calculates the stress-strain matrix
///
/// # Arguments
/// * `poisson_ratio` - The poisson ratio for the model
/// * `youngs_modulus` - The modulus of elasticity of the model
///
/// # Returns
/// A 3x3 stress-strain matrix
pub fn compute_stress_strain_matrix(poisson_ratio: f64, youngs_modulus: f64) -> Matrix3<f64> {
    let mut stress_strain_mat: Matrix3<f64> = matrix![
        1.0, poisson_ratio, 0.0;
        poisson_ratio, 1.0, 0.0;
        0.0, 0.0, (1.0 - poisson_ratio) / 2.0;
    ];

    stress_strain_mat *= youngs_modulus / (1.0 - f64::powi(poisson_ratio, 2));

    stress_strain_mat
}
