use tracing::info;

use crate::{
    error::{DynelError, DynelResult},
    mesh::Mesh,
    solver::GaussSeidel,
};

/// Flattens a horizon of the section to `target_y`.
///
/// Starts the solver, then moves every target node vertically onto
/// `target_y`, fixes it vertically and frees it horizontally so the layer can
/// slide. The imposed motion is recorded as displacement, so the surrounding
/// elements strain and the free nodes follow once the solver is stepped.
/// The solver is left running; use [`GaussSeidel::drive`] or
/// [`GaussSeidel::step`] to relax the section.
///
/// # Arguments
/// * `mesh` - The section to restore
/// * `solver` - The solver to start
/// * `target_nodes` - Ids of the nodes on the horizon
/// * `target_y` - Elevation of the restored horizon
///
/// # Errors
/// `NodeNotFound` for an unknown target, before anything is modified.
pub fn restore(
    mesh: &mut Mesh,
    solver: &mut GaussSeidel,
    target_nodes: &[usize],
    target_y: f64,
) -> DynelResult<()> {
    let mut indices = Vec::with_capacity(target_nodes.len());
    for &id in target_nodes {
        indices.push(mesh.node_index(id).ok_or(DynelError::NodeNotFound(id))?);
    }

    info!(
        nodes = target_nodes.len(),
        target_y, "starting geological restoration"
    );

    solver.start(mesh);

    for index in indices {
        let node = mesh.node_at_mut(index);
        let shift = target_y - node.position.y;

        node.position.y = target_y;
        node.displacement.y += shift;
        node.fixed_y = true;
        node.fixed_x = false;
    }

    Ok(())
}
