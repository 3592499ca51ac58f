use tracing::debug;

use crate::{
    error::{DynelError, DynelResult},
    material::Material,
    mesh::Mesh,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Construction,
    Nodes,
    Triangles,
}

/// Staged mesh construction.
///
/// ```text
/// begin_construction
///     begin_nodes      add_node ...      end_nodes
///     begin_triangles  add_triangle ...  end_triangles
/// end_construction -> Mesh
/// ```
///
/// Only the phase is tracked here; nodes and triangles go straight through
/// to the [`Mesh`] add methods.
#[derive(Debug)]
pub struct MeshBuilder {
    mesh: Mesh,
    phase: Phase,
}

impl Default for MeshBuilder {
    fn default() -> Self {
        MeshBuilder::new()
    }
}

impl MeshBuilder {
    pub fn new() -> MeshBuilder {
        MeshBuilder {
            mesh: Mesh::new(),
            phase: Phase::Idle,
        }
    }

    fn expect_phase(&self, expected: Phase, message: &str) -> DynelResult<()> {
        if self.phase != expected {
            return Err(DynelError::Protocol(format!(
                "{message} (currently in {:?} phase)",
                self.phase
            )));
        }
        Ok(())
    }

    pub fn begin_construction(&mut self) -> DynelResult<()> {
        self.expect_phase(Phase::Idle, "already in construction mode")?;
        self.phase = Phase::Construction;
        Ok(())
    }

    pub fn begin_nodes(&mut self) -> DynelResult<()> {
        self.expect_phase(Phase::Construction, "begin_nodes requires begin_construction")?;
        self.phase = Phase::Nodes;
        Ok(())
    }

    pub fn add_node(&mut self, id: usize, x: f64, y: f64, fixed: bool) -> DynelResult<()> {
        self.expect_phase(Phase::Nodes, "add_node requires begin_nodes")?;
        self.mesh.add_node(id, x, y, fixed)
    }

    pub fn end_nodes(&mut self) -> DynelResult<()> {
        self.expect_phase(Phase::Nodes, "end_nodes requires begin_nodes")?;
        self.phase = Phase::Construction;
        Ok(())
    }

    pub fn begin_triangles(&mut self) -> DynelResult<()> {
        self.expect_phase(Phase::Construction, "begin_triangles requires end_nodes")?;
        self.phase = Phase::Triangles;
        Ok(())
    }

    pub fn add_triangle(
        &mut self,
        id: usize,
        node_ids: [usize; 3],
        material: &Material,
    ) -> DynelResult<()> {
        self.expect_phase(Phase::Triangles, "add_triangle requires begin_triangles")?;
        self.mesh.add_triangle(id, node_ids, material)
    }

    pub fn end_triangles(&mut self) -> DynelResult<()> {
        self.expect_phase(Phase::Triangles, "end_triangles requires begin_triangles")?;
        self.phase = Phase::Construction;
        Ok(())
    }

    /// Boundary conditions may be set at any point during construction
    pub fn set_fixed_node(&mut self, id: usize, fixed_x: bool, fixed_y: bool) -> DynelResult<()> {
        if self.phase == Phase::Idle {
            return Err(DynelError::Protocol(
                "set_fixed_node requires begin_construction".to_owned(),
            ));
        }
        self.mesh.set_fixed_node(id, fixed_x, fixed_y)
    }

    /// Finishes construction and hands over the mesh
    pub fn end_construction(self) -> DynelResult<Mesh> {
        self.expect_phase(
            Phase::Construction,
            "end_construction requires an open construction with no open node or triangle block",
        )?;

        debug!(
            nodes = self.mesh.get_nodes().len(),
            triangles = self.mesh.get_triangles().len(),
            "mesh construction complete"
        );

        Ok(self.mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material() -> Material {
        Material::new(1.0, 0.25, 1.0).unwrap()
    }

    #[test]
    fn test_full_protocol() {
        let mut builder = MeshBuilder::new();
        builder.begin_construction().unwrap();
        builder.begin_nodes().unwrap();
        builder.add_node(0, 0.0, 0.0, true).unwrap();
        builder.add_node(1, 1.0, 0.0, false).unwrap();
        builder.add_node(2, 0.0, 1.0, false).unwrap();
        builder.end_nodes().unwrap();
        builder.begin_triangles().unwrap();
        builder.add_triangle(0, [0, 1, 2], &material()).unwrap();
        builder.end_triangles().unwrap();
        builder.set_fixed_node(1, false, true).unwrap();

        let mesh = builder.end_construction().unwrap();
        assert_eq!(mesh.get_nodes().len(), 3);
        assert_eq!(mesh.get_triangles().len(), 1);
        assert!(mesh.get_node(1).unwrap().fixed_y);
    }

    #[test]
    fn test_out_of_order_calls() {
        let mut builder = MeshBuilder::new();
        assert!(matches!(
            builder.add_node(0, 0.0, 0.0, false),
            Err(DynelError::Protocol(_))
        ));
        assert!(matches!(builder.begin_nodes(), Err(DynelError::Protocol(_))));

        builder.begin_construction().unwrap();
        assert!(matches!(builder.begin_construction(), Err(DynelError::Protocol(_))));
        assert!(matches!(
            builder.add_triangle(0, [0, 1, 2], &material()),
            Err(DynelError::Protocol(_))
        ));

        builder.begin_nodes().unwrap();
        assert!(matches!(builder.begin_triangles(), Err(DynelError::Protocol(_))));
        assert!(matches!(builder.end_triangles(), Err(DynelError::Protocol(_))));
    }

    #[test]
    fn test_end_construction_with_open_block() {
        let mut builder = MeshBuilder::new();
        builder.begin_construction().unwrap();
        builder.begin_nodes().unwrap();
        builder.add_node(0, 0.0, 0.0, false).unwrap();

        assert!(matches!(
            builder.end_construction(),
            Err(DynelError::Protocol(_))
        ));
    }

    #[test]
    fn test_construction_errors_pass_through() {
        let mut builder = MeshBuilder::new();
        builder.begin_construction().unwrap();
        builder.begin_nodes().unwrap();
        builder.add_node(0, 0.0, 0.0, false).unwrap();
        builder.end_nodes().unwrap();
        builder.begin_triangles().unwrap();

        assert!(matches!(
            builder.add_triangle(0, [0, 1, 2], &material()),
            Err(DynelError::Construction(_))
        ));
    }
}
