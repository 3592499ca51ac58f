use std::collections::BTreeMap;

use nalgebra::Matrix2;
use tracing::{debug, trace};

use crate::{
    datatypes::{Contact, ExportResults, Node, NodeRecord, Point2D, TriangleRecord},
    element::{max_coulomb_shear_stress, Triangle},
    error::{DynelError, DynelResult},
    material::Material,
};

/// Nodal stiffness determinants at or below this are treated as singular
pub const SINGULAR_DETERMINANT: f64 = 1e-12;

/// Penalty stiffness applied to penetrating contacts
pub const DEFAULT_PENALTY_STIFFNESS: f64 = 1e6;

/// Triangulated section: node and element arenas with id lookups.
///
/// Nodes and elements are stored densely in insertion order. Elements refer
/// to nodes, and nodes to their incident elements, by arena index only.
/// The lumped 2x2 stiffness of every node is accumulated as elements are
/// added, since element stiffness never changes after creation.
#[derive(Debug, Clone)]
pub struct Mesh {
    nodes: Vec<Node>,
    elements: Vec<Triangle>,
    node_lookup: BTreeMap<usize, usize>,
    element_lookup: BTreeMap<usize, usize>,
    nodal_stiffness: Vec<Matrix2<f64>>,
    /// Arena indices sorted by node id
    sweep_order: Vec<usize>,
    contacts: Vec<Contact>,
    penalty_stiffness: f64,
}

impl Default for Mesh {
    fn default() -> Self {
        Mesh::new()
    }
}

impl Mesh {
    pub fn new() -> Mesh {
        Mesh {
            nodes: Vec::new(),
            elements: Vec::new(),
            node_lookup: BTreeMap::new(),
            element_lookup: BTreeMap::new(),
            nodal_stiffness: Vec::new(),
            sweep_order: Vec::new(),
            contacts: Vec::new(),
            penalty_stiffness: DEFAULT_PENALTY_STIFFNESS,
        }
    }

    /// Adds a node at (x, y). `fixed` constrains both axes.
    pub fn add_node(&mut self, id: usize, x: f64, y: f64, fixed: bool) -> DynelResult<()> {
        if self.node_lookup.contains_key(&id) {
            return Err(DynelError::Construction(format!("duplicate node id {id}")));
        }

        let index = self.nodes.len();
        let rank = self
            .sweep_order
            .partition_point(|&i| self.nodes[i].id < id);
        self.sweep_order.insert(rank, index);

        self.node_lookup.insert(id, index);
        self.nodes.push(Node::new(id, x, y, fixed));
        self.nodal_stiffness.push(Matrix2::zeros());

        Ok(())
    }

    /// Adds a constant strain triangle over three existing nodes
    ///
    /// # Arguments
    /// * `id` - The element id
    /// * `node_ids` - The ids of the three vertices
    /// * `material` - The element material. The element keeps its own copy,
    ///   so later edits to `material` do not reach elements already added.
    ///
    /// # Errors
    /// `Construction` if any vertex id is unknown or the element id is taken.
    /// Nothing is modified in that case.
    pub fn add_triangle(
        &mut self,
        id: usize,
        node_ids: [usize; 3],
        material: &Material,
    ) -> DynelResult<()> {
        if self.element_lookup.contains_key(&id) {
            return Err(DynelError::Construction(format!("duplicate element id {id}")));
        }

        let missing: Vec<usize> = node_ids
            .iter()
            .copied()
            .filter(|n| !self.node_lookup.contains_key(n))
            .collect();
        if !missing.is_empty() {
            return Err(DynelError::Construction(format!(
                "element {id} references unknown nodes {missing:?}"
            )));
        }

        let indices = node_ids.map(|n| self.node_lookup[&n]);
        let element_index = self.elements.len();
        let triangle = Triangle::new(id, indices, &self.nodes, material.clone());

        for (local, &node_index) in indices.iter().enumerate() {
            self.nodes[node_index].elements.push(element_index);
            self.nodal_stiffness[node_index] += triangle.nodal_stiffness_block(local);
        }

        debug!(element = id, nodes = ?node_ids, area = triangle.area(), "added triangle");

        self.element_lookup.insert(id, element_index);
        self.elements.push(triangle);

        Ok(())
    }

    /// Sets the per axis constraints of a node. Idempotent.
    pub fn set_fixed_node(&mut self, id: usize, fixed_x: bool, fixed_y: bool) -> DynelResult<()> {
        let node = self.node_by_id_mut(id)?;
        node.fixed_x = fixed_x;
        node.fixed_y = fixed_y;
        Ok(())
    }

    /// Adds (fx, fy) to the external load of a node
    pub fn apply_force(&mut self, id: usize, fx: f64, fy: f64) -> DynelResult<()> {
        let node = self.node_by_id_mut(id)?;
        node.force += Point2D::new(fx, fy);
        Ok(())
    }

    pub fn get_nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get_triangles(&self) -> &[Triangle] {
        &self.elements
    }

    pub fn get_node(&self, id: usize) -> Option<&Node> {
        self.node_lookup.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn get_triangle(&self, id: usize) -> Option<&Triangle> {
        self.element_lookup.get(&id).map(|&i| &self.elements[i])
    }

    pub fn node_index(&self, id: usize) -> Option<usize> {
        self.node_lookup.get(&id).copied()
    }

    fn node_by_id_mut(&mut self, id: usize) -> DynelResult<&mut Node> {
        match self.node_lookup.get(&id) {
            Some(&i) => Ok(&mut self.nodes[i]),
            None => Err(DynelError::NodeNotFound(id)),
        }
    }

    fn index_of(&self, id: usize) -> DynelResult<usize> {
        self.node_index(id).ok_or(DynelError::NodeNotFound(id))
    }

    pub(crate) fn node_at_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }

    /// Arena indices in ascending node id order
    pub fn sweep_order(&self) -> &[usize] {
        &self.sweep_order
    }

    /// Arena index of the node visited at `rank` in a sweep
    pub(crate) fn sweep_index(&self, rank: usize) -> usize {
        self.sweep_order[rank]
    }

    /// Lumped 2x2 stiffness of a node: the sum of the diagonal blocks of its
    /// incident element stiffness matrices
    pub fn nodal_stiffness(&self, id: usize) -> DynelResult<Matrix2<f64>> {
        Ok(self.nodal_stiffness[self.index_of(id)?])
    }

    /// External load plus the restoring forces of the incident elements
    pub fn nodal_force(&self, id: usize) -> DynelResult<Point2D> {
        Ok(self.nodal_force_at(self.index_of(id)?))
    }

    /// Displacement increment solving `K·Δu = F` for a node, if defined
    pub fn nodal_displacement_increment(&self, id: usize) -> DynelResult<Option<Point2D>> {
        Ok(self.displacement_increment_at(self.index_of(id)?))
    }

    pub(crate) fn nodal_force_at(&self, index: usize) -> Point2D {
        let node = &self.nodes[index];
        let mut total = node.force;

        for &element_index in node.elements.iter() {
            let element = &self.elements[element_index];
            if let Some(local) = element.local_index(index) {
                total += element.nodal_force_at(&self.nodes, local);
            }
        }

        total
    }

    /// Returns `None` when the node is fully fixed, its free force is exactly
    /// zero, or its 2x2 stiffness is singular.
    ///
    /// A node constrained on one axis only relaxes the free axis against its
    /// diagonal stiffness; the constrained axis carries a reaction. The
    /// singularity test still applies to the full 2x2 block.
    pub(crate) fn displacement_increment_at(&self, index: usize) -> Option<Point2D> {
        let node = &self.nodes[index];
        if node.is_fully_fixed() {
            return None;
        }

        let mut force = self.nodal_force_at(index);
        if node.fixed_x {
            force.x = 0.0;
        }
        if node.fixed_y {
            force.y = 0.0;
        }
        if force.is_null() {
            return None;
        }

        let k = &self.nodal_stiffness[index];

        let det = k[(0, 0)] * k[(1, 1)] - k[(0, 1)] * k[(1, 0)];
        if det.abs() <= SINGULAR_DETERMINANT {
            trace!(node = node.id, det, "singular nodal stiffness");
            return None;
        }

        if node.fixed_y {
            return solve_scalar(k[(0, 0)], force.x).map(|dx| Point2D::new(dx, 0.0));
        }
        if node.fixed_x {
            return solve_scalar(k[(1, 1)], force.y).map(|dy| Point2D::new(0.0, dy));
        }

        Some(Point2D::new(
            (k[(1, 1)] * force.x - k[(0, 1)] * force.y) / det,
            (-k[(1, 0)] * force.x + k[(0, 0)] * force.y) / det,
        ))
    }

    /// Zeroes every cumulative displacement. Positions and loads are kept.
    pub(crate) fn clear_displacements(&mut self) {
        for node in self.nodes.iter_mut() {
            node.displacement = Point2D::ZERO;
        }
    }

    /// Puts every node back at its original position with no load and no
    /// displacement
    pub(crate) fn restore_original_state(&mut self) {
        for node in self.nodes.iter_mut() {
            node.position = node.original_position;
            node.displacement = Point2D::ZERO;
            node.force = Point2D::ZERO;
        }
    }

    /// Maximum Coulomb shear stress of every element
    ///
    /// # Arguments
    /// * `friction_angle` - Internal friction angle in degrees
    ///
    /// # Returns
    /// A map from element id to MCSS
    pub fn calculate_mcss(&self, friction_angle: f64) -> BTreeMap<usize, f64> {
        self.elements
            .iter()
            .map(|element| {
                let stress = element.stress(&self.nodes);
                (element.id, max_coulomb_shear_stress(&stress, friction_angle))
            })
            .collect()
    }

    /// Ids of elements whose largest absolute strain component exceeds
    /// `limit`. Element geometry is frozen at creation, so results for these
    /// elements are outside the small strain assumption.
    pub fn small_strain_violations(&self, limit: f64) -> Vec<usize> {
        self.elements
            .iter()
            .filter(|element| element.strain(&self.nodes).amax() > limit)
            .map(|element| element.id)
            .collect()
    }

    /// Snapshot of node positions and loads and element stress and strain
    pub fn export_results(&self) -> ExportResults {
        let nodes = self
            .nodes
            .iter()
            .map(|node| NodeRecord {
                id: node.id,
                x: node.position.x,
                y: node.position.y,
                fx: node.force.x,
                fy: node.force.y,
            })
            .collect();

        let triangles = self
            .elements
            .iter()
            .map(|element| {
                let strain = element.strain(&self.nodes);
                let stress = element.stress_from(&strain);
                TriangleRecord {
                    id: element.id,
                    node_ids: element.node_ids(),
                    stress: [stress[0], stress[1], stress[2]],
                    strain: [strain[0], strain[1], strain[2]],
                }
            })
            .collect();

        ExportResults { nodes, triangles }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn penalty_stiffness(&self) -> f64 {
        self.penalty_stiffness
    }

    pub fn set_penalty_stiffness(&mut self, penalty_stiffness: f64) {
        self.penalty_stiffness = penalty_stiffness;
    }

    /// Rebuilds the contact list between fault surfaces.
    ///
    /// No detector is implemented yet, so the list is always empty.
    pub fn detect_contacts(&mut self) -> &[Contact] {
        self.contacts.clear();
        &self.contacts
    }

    /// Pushes every penetrating slave node out along the contact normal with
    /// a penalty force `|distance|·penalty·normal`
    pub fn apply_contact_forces(&mut self) {
        for contact in self.contacts.iter() {
            if contact.distance >= 0.0 {
                continue;
            }
            let Some(&index) = self.node_lookup.get(&contact.slave_node_id) else {
                continue;
            };

            let magnitude = contact.distance.abs() * self.penalty_stiffness;
            self.nodes[index].force += contact.normal * magnitude;
        }
    }
}

fn solve_scalar(stiffness: f64, force: f64) -> Option<f64> {
    if stiffness.abs() <= SINGULAR_DETERMINANT {
        return None;
    }
    Some(force / stiffness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rock() -> Material {
        Material::new(1e9, 0.25, 2500.0).unwrap()
    }

    fn single_triangle() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_node(0, 0.0, 0.0, true).unwrap();
        mesh.add_node(1, 1.0, 0.0, true).unwrap();
        mesh.add_node(2, 0.0, 1.0, false).unwrap();
        mesh.add_triangle(0, [0, 1, 2], &rock()).unwrap();
        mesh
    }

    #[test]
    fn test_add_node_rejects_duplicates() {
        let mut mesh = Mesh::new();
        mesh.add_node(4, 0.0, 0.0, false).unwrap();
        assert!(matches!(
            mesh.add_node(4, 1.0, 1.0, false),
            Err(DynelError::Construction(_))
        ));
        assert_eq!(mesh.get_nodes().len(), 1);
        assert_eq!(mesh.get_node(4).unwrap().position, Point2D::new(0.0, 0.0));
    }

    #[test]
    fn test_add_triangle_unknown_node_is_atomic() {
        let mut mesh = single_triangle();
        let before = mesh.get_triangles().len();
        let adjacency_before: Vec<usize> = mesh.get_nodes().iter().map(|n| n.elements().len()).collect();

        let result = mesh.add_triangle(1, [0, 2, 99], &rock());

        assert!(matches!(result, Err(DynelError::Construction(_))));
        assert_eq!(mesh.get_triangles().len(), before);
        assert!(mesh.get_triangle(1).is_none());
        let adjacency_after: Vec<usize> = mesh.get_nodes().iter().map(|n| n.elements().len()).collect();
        assert_eq!(adjacency_before, adjacency_after);
    }

    #[test]
    fn test_add_triangle_rejects_duplicate_id() {
        let mut mesh = single_triangle();
        mesh.add_node(3, 1.0, 1.0, false).unwrap();
        assert!(mesh.add_triangle(0, [1, 3, 2], &rock()).is_err());
        assert_eq!(mesh.get_triangles().len(), 1);
    }

    #[test]
    fn test_adjacency_registered() {
        let mut mesh = single_triangle();
        mesh.add_node(3, 1.0, 1.0, false).unwrap();
        mesh.add_triangle(7, [1, 3, 2], &rock()).unwrap();

        assert_eq!(mesh.get_node(0).unwrap().elements(), &[0]);
        assert_eq!(mesh.get_node(2).unwrap().elements(), &[0, 1]);
        assert_eq!(mesh.get_node(3).unwrap().elements(), &[1]);
        assert_eq!(mesh.get_triangle(7).unwrap().node_ids(), [1, 3, 2]);
    }

    #[test]
    fn test_fixity_flags() {
        let mut mesh = single_triangle();
        mesh.set_fixed_node(2, false, true).unwrap();
        mesh.set_fixed_node(2, false, true).unwrap();

        let node = mesh.get_node(2).unwrap();
        assert!(!node.fixed_x);
        assert!(node.fixed_y);
        assert!(node.is_fixed());
        assert!(!node.is_fully_fixed());

        mesh.set_fixed_node(2, false, false).unwrap();
        assert!(!mesh.get_node(2).unwrap().is_fixed());
    }

    #[test]
    fn test_unknown_node_boundary_conditions_fail() {
        let mut mesh = single_triangle();
        assert!(matches!(
            mesh.apply_force(42, 1.0, 0.0),
            Err(DynelError::NodeNotFound(42))
        ));
        assert!(matches!(
            mesh.set_fixed_node(42, true, true),
            Err(DynelError::NodeNotFound(42))
        ));
    }

    #[test]
    fn test_apply_force_accumulates() {
        let mut mesh = single_triangle();
        mesh.apply_force(2, 1.0, -2.0).unwrap();
        mesh.apply_force(2, 0.5, -1.0).unwrap();
        assert_eq!(mesh.get_node(2).unwrap().force, Point2D::new(1.5, -3.0));
    }

    #[test]
    fn test_nodal_stiffness_sums_blocks() {
        let mut mesh = single_triangle();
        mesh.add_node(3, 1.0, 1.0, false).unwrap();
        mesh.add_triangle(1, [1, 3, 2], &rock()).unwrap();

        let first = mesh.get_triangle(0).unwrap().nodal_stiffness_block(2);
        let second = mesh.get_triangle(1).unwrap().nodal_stiffness_block(2);
        assert_relative_eq!(mesh.nodal_stiffness(2).unwrap(), first + second);
    }

    #[test]
    fn test_isolated_node_never_moves() {
        let mut mesh = single_triangle();
        mesh.add_node(10, 5.0, 5.0, false).unwrap();
        mesh.apply_force(10, 100.0, 100.0).unwrap();

        assert_eq!(mesh.nodal_displacement_increment(10).unwrap(), None);
    }

    #[test]
    fn test_increment_skips() {
        let mut mesh = single_triangle();
        // fully fixed
        mesh.apply_force(0, 10.0, 10.0).unwrap();
        assert_eq!(mesh.nodal_displacement_increment(0).unwrap(), None);
        // no load, no deformation
        assert_eq!(mesh.nodal_displacement_increment(2).unwrap(), None);
    }

    #[test]
    fn test_increment_solves_nodal_system() {
        let mut mesh = single_triangle();
        mesh.apply_force(2, 0.0, -1000.0).unwrap();

        let k = mesh.nodal_stiffness(2).unwrap();
        let du = mesh.nodal_displacement_increment(2).unwrap().unwrap();

        assert_relative_eq!(k[(0, 0)] * du.x + k[(0, 1)] * du.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(k[(1, 0)] * du.x + k[(1, 1)] * du.y, -1000.0, epsilon = 1e-6);
        assert!(du.y < 0.0);
    }

    #[test]
    fn test_partially_fixed_increment_uses_free_axis() {
        let mut mesh = single_triangle();
        mesh.set_fixed_node(2, true, false).unwrap();
        mesh.apply_force(2, 500.0, -1000.0).unwrap();

        let k = mesh.nodal_stiffness(2).unwrap();
        let du = mesh.nodal_displacement_increment(2).unwrap().unwrap();

        assert_eq!(du.x, 0.0);
        assert_relative_eq!(du.y, -1000.0 / k[(1, 1)]);
    }

    #[test]
    fn test_partially_fixed_singular_node_is_skipped() {
        let soft = Material::new(1e-6, 0.25, 1.0).unwrap();
        let mut mesh = Mesh::new();
        mesh.add_node(0, 0.0, 0.0, true).unwrap();
        mesh.add_node(1, 1.0, 0.0, true).unwrap();
        mesh.add_node(2, 0.0, 1.0, false).unwrap();
        mesh.add_triangle(0, [0, 1, 2], &soft).unwrap();
        mesh.apply_force(2, 0.0, -1.0).unwrap();

        let k = mesh.nodal_stiffness(2).unwrap();
        assert!(k.determinant().abs() <= SINGULAR_DETERMINANT);
        assert!(k[(1, 1)] > SINGULAR_DETERMINANT);
        assert_eq!(mesh.nodal_displacement_increment(2).unwrap(), None);

        mesh.set_fixed_node(2, true, false).unwrap();
        assert_eq!(mesh.nodal_displacement_increment(2).unwrap(), None);

        mesh.set_fixed_node(2, false, true).unwrap();
        mesh.apply_force(2, 1.0, 0.0).unwrap();
        assert_eq!(mesh.nodal_displacement_increment(2).unwrap(), None);
    }

    #[test]
    fn test_sweep_order_follows_ids() {
        let mut mesh = Mesh::new();
        for id in [7, 2, 9, 0, 4] {
            mesh.add_node(id, id as f64, 0.0, false).unwrap();
        }

        let ids: Vec<usize> = mesh
            .sweep_order()
            .iter()
            .map(|&i| mesh.get_nodes()[i].id)
            .collect();
        assert_eq!(ids, vec![0, 2, 4, 7, 9]);
        assert_eq!(mesh.sweep_index(0), 3);
    }

    #[test]
    fn test_nodal_force_includes_restoring_force() {
        let mut mesh = single_triangle();
        mesh.apply_force(2, 0.0, -1000.0).unwrap();
        mesh.node_at_mut(2).displacement = Point2D::new(0.0, -1e-6);

        let k = mesh.nodal_stiffness(2).unwrap();
        let force = mesh.nodal_force(2).unwrap();
        assert_relative_eq!(force.y, -1000.0 + k[(1, 1)] * 1e-6, epsilon = 1e-6);
    }

    #[test]
    fn test_mcss_without_load_is_zero() {
        let mesh = single_triangle();
        let mcss = mesh.calculate_mcss(30.0);
        assert_eq!(mcss.len(), 1);
        assert_eq!(mcss[&0], 0.0);
    }

    #[test]
    fn test_mcss_matches_element_stress() {
        let mut mesh = single_triangle();
        mesh.node_at_mut(2).displacement = Point2D::new(1e-4, -2e-4);

        let stress = mesh.get_triangle(0).unwrap().stress(mesh.get_nodes());
        let expected = max_coulomb_shear_stress(&stress, 25.0);
        assert_relative_eq!(mesh.calculate_mcss(25.0)[&0], expected);
        // pure query
        assert_eq!(mesh.get_node(2).unwrap().displacement, Point2D::new(1e-4, -2e-4));
    }

    #[test]
    fn test_export_results() {
        let mut mesh = single_triangle();
        mesh.apply_force(2, 3.0, -4.0).unwrap();

        let results = mesh.export_results();
        assert_eq!(results.nodes.len(), 3);
        assert_eq!(
            results.nodes[2],
            NodeRecord { id: 2, x: 0.0, y: 1.0, fx: 3.0, fy: -4.0 }
        );
        assert_eq!(results.triangles[0].node_ids, [0, 1, 2]);
        assert_eq!(results.triangles[0].stress, [0.0; 3]);
        assert_eq!(results.triangles[0].strain, [0.0; 3]);
    }

    #[test]
    fn test_small_strain_violations() {
        let mut mesh = single_triangle();
        assert!(mesh.small_strain_violations(0.05).is_empty());

        mesh.node_at_mut(2).displacement = Point2D::new(0.0, -0.2);
        assert_eq!(mesh.small_strain_violations(0.05), vec![0]);
    }

    #[test]
    fn test_contact_extension_point() {
        let mut mesh = single_triangle();
        assert!(mesh.detect_contacts().is_empty());
        mesh.apply_contact_forces();
        assert_eq!(mesh.get_node(2).unwrap().force, Point2D::ZERO);

        mesh.contacts.push(Contact {
            slave_node_id: 2,
            master_segment: [0, 1],
            normal: Point2D::new(0.0, 1.0),
            distance: -0.01,
        });
        mesh.contacts.push(Contact {
            slave_node_id: 1,
            master_segment: [0, 2],
            normal: Point2D::new(1.0, 0.0),
            distance: 0.5,
        });
        mesh.apply_contact_forces();

        assert_relative_eq!(mesh.get_node(2).unwrap().force.y, 0.01 * DEFAULT_PENALTY_STIFFNESS);
        assert_eq!(mesh.get_node(1).unwrap().force, Point2D::ZERO);

        mesh.detect_contacts();
        assert!(mesh.contacts().is_empty());
    }
}
