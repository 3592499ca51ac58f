use json::JsonValue;
use tracing::info;

use crate::{
    error::{DynelError, DynelResult},
    material::Material,
    mesh::Mesh,
    solver::SolverConfig,
};

/// Axis aligned selection box. Bounds are inclusive and open ended when
/// missing.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundaryRegion {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// Constraints and loads applied to every node inside a region
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryTarget {
    pub fixed_x: Option<bool>,
    pub fixed_y: Option<bool>,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRule {
    pub name: String,
    pub region: BoundaryRegion,
    pub target: BoundaryTarget,
}

/// Horizon to flatten and its target elevation
#[derive(Debug, Clone, PartialEq)]
pub struct Restoration {
    pub target_nodes: Vec<usize>,
    pub target_y: f64,
}

/// Everything needed to run a model from the command line
#[derive(Debug)]
pub struct ModelInput {
    pub mesh: Mesh,
    pub solver_config: SolverConfig,
    pub restoration: Option<Restoration>,
}

/// Loads an input file into a JsonValue
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
fn load_input_file(input_file: &str) -> DynelResult<JsonValue> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(DynelError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    parse_json(&file_string)
}

fn parse_json(contents: &str) -> DynelResult<JsonValue> {
    let input_json = match json::parse(contents) {
        Ok(f) => f,
        Err(err) => return Err(DynelError::Input(format!("Error in input file json: {err}"))),
    };

    for key in ["metadata", "nodes", "triangles"] {
        if !input_json.has_key(key) {
            return Err(DynelError::Input(format!("Input json missing {key} field")));
        }
    }
    for key in ["youngs_modulus", "poisson_ratio"] {
        if !input_json["metadata"].has_key(key) {
            return Err(DynelError::Input(format!(
                "Input json missing {key} field in metadata section"
            )));
        }
    }

    Ok(input_json)
}

fn required_f64(value: &JsonValue, what: &str) -> DynelResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| DynelError::Input(format!("Bad or missing value for {what}")))
}

fn required_usize(value: &JsonValue, what: &str) -> DynelResult<usize> {
    value
        .as_usize()
        .ok_or_else(|| DynelError::Input(format!("Bad or missing value for {what}")))
}

fn optional_f64(value: &JsonValue, what: &str) -> DynelResult<Option<f64>> {
    if value.is_null() {
        return Ok(None);
    }
    required_f64(value, what).map(Some)
}

fn optional_bool(value: &JsonValue, what: &str) -> DynelResult<Option<bool>> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_bool()
        .map(Some)
        .ok_or_else(|| DynelError::Input(format!("Bad value for {what}")))
}

/// Parses the material from the metadata section
fn parse_material(input_json: &JsonValue) -> DynelResult<Material> {
    let metadata = &input_json["metadata"];
    let youngs_modulus = required_f64(&metadata["youngs_modulus"], "youngs_modulus")?;
    let poisson_ratio = required_f64(&metadata["poisson_ratio"], "poisson_ratio")?;
    let density = optional_f64(&metadata["density"], "density")?.unwrap_or(1.0);

    Material::new(youngs_modulus, poisson_ratio, density)
}

/// Parses the optional solver section, falling back on defaults per key
fn parse_solver_config(input_json: &JsonValue) -> DynelResult<SolverConfig> {
    let mut config = SolverConfig::default();
    let solver = &input_json["solver"];

    if let Some(threshold) = optional_f64(&solver["convergence_threshold"], "convergence_threshold")? {
        config.convergence_threshold = threshold;
    }
    if solver.has_key("max_iterations") {
        config.max_iterations = required_usize(&solver["max_iterations"], "max_iterations")?;
    }
    if let Some(damping) = optional_f64(&solver["damping"], "damping")? {
        config.damping = damping;
    }

    config.validate()?;
    Ok(config)
}

fn parse_region(region_json: &JsonValue, name: &str) -> DynelResult<BoundaryRegion> {
    let bound = |key: &str, default: f64| -> DynelResult<f64> {
        Ok(optional_f64(&region_json[key], &format!("{key} in {name}"))?.unwrap_or(default))
    };

    let region = BoundaryRegion {
        x_min: bound("x_target_min", f64::MIN)?,
        x_max: bound("x_target_max", f64::MAX)?,
        y_min: bound("y_target_min", f64::MIN)?,
        y_max: bound("y_target_max", f64::MAX)?,
    };

    if region.x_min > region.x_max {
        return Err(DynelError::Input(format!(
            "Region '{name}' has x_target_min greater than x_target_max"
        )));
    }
    if region.y_min > region.y_max {
        return Err(DynelError::Input(format!(
            "Region '{name}' has y_target_min greater than y_target_max"
        )));
    }

    Ok(region)
}

/// Builds the mesh from the nodes and triangles sections
fn build_mesh(input_json: &JsonValue, material: &Material) -> DynelResult<Mesh> {
    let mut mesh = Mesh::new();

    for (i, node_json) in input_json["nodes"].members().enumerate() {
        let id = if node_json["id"].is_null() {
            i
        } else {
            required_usize(&node_json["id"], &format!("id of node {i}"))?
        };
        let x = required_f64(&node_json["x"], &format!("x of node {id}"))?;
        let y = required_f64(&node_json["y"], &format!("y of node {id}"))?;
        let fixed = optional_bool(&node_json["fixed"], &format!("fixed of node {id}"))?
            .unwrap_or(false);

        mesh.add_node(id, x, y, fixed)?;
    }

    for (i, triangle_json) in input_json["triangles"].members().enumerate() {
        let id = if triangle_json["id"].is_null() {
            i
        } else {
            required_usize(&triangle_json["id"], &format!("id of triangle {i}"))?
        };

        let nodes_json = &triangle_json["nodes"];
        if nodes_json.len() != 3 {
            return Err(DynelError::Input(format!(
                "Triangle {id} must reference exactly three nodes"
            )));
        }
        let mut node_ids = [0usize; 3];
        for (slot, node_json) in node_ids.iter_mut().zip(nodes_json.members()) {
            *slot = required_usize(node_json, &format!("node of triangle {id}"))?;
        }

        mesh.add_triangle(id, node_ids, material)?;
    }

    info!(
        nodes = mesh.get_nodes().len(),
        triangles = mesh.get_triangles().len(),
        "loaded mesh from input file"
    );

    Ok(mesh)
}

/// Parses the named boundary rules
fn parse_boundary_rules(input_json: &JsonValue) -> DynelResult<Vec<BoundaryRule>> {
    let mut rules: Vec<BoundaryRule> = Vec::new();

    for (name, rule_json) in input_json["boundary_conditions"].entries() {
        if !rule_json.has_key("region") {
            return Err(DynelError::Input(format!(
                "Boundary rule {name} is missing region field"
            )));
        }
        if !rule_json.has_key("targets") {
            return Err(DynelError::Input(format!(
                "Boundary rule {name} is missing targets field"
            )));
        }

        let targets = &rule_json["targets"];
        let target = BoundaryTarget {
            fixed_x: optional_bool(&targets["fixed_x"], &format!("fixed_x in {name}"))?,
            fixed_y: optional_bool(&targets["fixed_y"], &format!("fixed_y in {name}"))?,
            fx: optional_f64(&targets["fx"], &format!("fx in {name}"))?,
            fy: optional_f64(&targets["fy"], &format!("fy in {name}"))?,
        };

        rules.push(BoundaryRule {
            name: name.to_string(),
            region: parse_region(&rule_json["region"], name)?,
            target,
        });
    }

    Ok(rules)
}

/// Applies boundary rules to every node inside their region. Later rules
/// override the constraints of earlier ones; loads accumulate.
pub fn apply_boundary_conditions(mesh: &mut Mesh, rules: &[BoundaryRule]) -> DynelResult<()> {
    let snapshot: Vec<(usize, f64, f64, bool, bool)> = mesh
        .get_nodes()
        .iter()
        .map(|n| (n.id, n.position.x, n.position.y, n.fixed_x, n.fixed_y))
        .collect();

    for (id, x, y, mut fixed_x, mut fixed_y) in snapshot {
        for rule in rules.iter().filter(|r| r.region.contains(x, y)) {
            fixed_x = rule.target.fixed_x.unwrap_or(fixed_x);
            fixed_y = rule.target.fixed_y.unwrap_or(fixed_y);

            let fx = rule.target.fx.unwrap_or(0.0);
            let fy = rule.target.fy.unwrap_or(0.0);
            if fx != 0.0 || fy != 0.0 {
                mesh.apply_force(id, fx, fy)?;
            }
        }
        mesh.set_fixed_node(id, fixed_x, fixed_y)?;
    }

    info!(rules = rules.len(), "applied boundary rules");

    Ok(())
}

/// Parses the optional restore section. Targets are given either as a
/// `nodes` id list or as a `region`.
fn parse_restoration(input_json: &JsonValue, mesh: &Mesh) -> DynelResult<Option<Restoration>> {
    let restore_json = &input_json["restore"];
    if restore_json.is_null() {
        return Ok(None);
    }

    let target_y = required_f64(&restore_json["target_y"], "target_y in restore")?;

    let target_nodes = if restore_json.has_key("nodes") {
        restore_json["nodes"]
            .members()
            .map(|n| required_usize(n, "node in restore"))
            .collect::<DynelResult<Vec<usize>>>()?
    } else if restore_json.has_key("region") {
        let region = parse_region(&restore_json["region"], "restore")?;
        mesh.get_nodes()
            .iter()
            .filter(|n| region.contains(n.position.x, n.position.y))
            .map(|n| n.id)
            .collect()
    } else {
        return Err(DynelError::Input(
            "Restore section needs either nodes or region".to_owned(),
        ));
    };

    Ok(Some(Restoration {
        target_nodes,
        target_y,
    }))
}

/// Builds a model from the contents of an input file
pub fn parse_model(contents: &str) -> DynelResult<ModelInput> {
    build_model(&parse_json(contents)?)
}

fn build_model(input_json: &JsonValue) -> DynelResult<ModelInput> {
    let material = parse_material(input_json)?;
    let solver_config = parse_solver_config(input_json)?;
    let mut mesh = build_mesh(input_json, &material)?;

    let rules = parse_boundary_rules(input_json)?;
    apply_boundary_conditions(&mut mesh, &rules)?;

    let restoration = parse_restoration(input_json, &mesh)?;

    Ok(ModelInput {
        mesh,
        solver_config,
        restoration,
    })
}

/// Loads a model from an input file
///
/// # Arguments
/// * `input_file` - Path to the json input file
pub fn run(input_file: &str) -> DynelResult<ModelInput> {
    build_model(&load_input_file(input_file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Point2D;

    const MODEL: &str = r#"{
        "metadata": { "youngs_modulus": 1e9, "poisson_ratio": 0.25, "density": 2500 },
        "solver": { "convergence_threshold": 1e-9, "max_iterations": 500 },
        "nodes": [
            { "id": 0, "x": 0.0, "y": 0.0 },
            { "id": 1, "x": 1.0, "y": 0.0 },
            { "id": 2, "x": 0.0, "y": 1.0 },
            { "id": 3, "x": 1.0, "y": 1.2 }
        ],
        "triangles": [
            { "id": 0, "nodes": [0, 1, 2] },
            { "id": 1, "nodes": [1, 3, 2] }
        ],
        "boundary_conditions": {
            "base": { "region": { "y_target_max": 0.0 }, "targets": { "fixed_x": true, "fixed_y": true } },
            "load": { "region": { "x_target_min": 0.5, "y_target_min": 0.5 }, "targets": { "fy": -100.0 } }
        },
        "restore": { "region": { "y_target_min": 0.5 }, "target_y": 1.0 }
    }"#;

    #[test]
    fn test_parse_model() {
        let model = parse_model(MODEL).unwrap();

        assert_eq!(model.mesh.get_nodes().len(), 4);
        assert_eq!(model.mesh.get_triangles().len(), 2);
        assert_eq!(model.solver_config.convergence_threshold, 1e-9);
        assert_eq!(model.solver_config.max_iterations, 500);
        assert_eq!(model.solver_config.damping, 0.8);

        let base = model.mesh.get_node(1).unwrap();
        assert!(base.fixed_x && base.fixed_y);
        let top = model.mesh.get_node(3).unwrap();
        assert!(!top.is_fixed());
        assert_eq!(top.force, Point2D::new(0.0, -100.0));
        assert_eq!(model.mesh.get_node(2).unwrap().force, Point2D::ZERO);

        let restoration = model.restoration.unwrap();
        assert_eq!(restoration.target_nodes, vec![2, 3]);
        assert_eq!(restoration.target_y, 1.0);
    }

    #[test]
    fn test_missing_sections() {
        assert!(matches!(parse_model("{}"), Err(DynelError::Input(_))));
        assert!(matches!(parse_model("not json"), Err(DynelError::Input(_))));

        let no_modulus = r#"{ "metadata": { "poisson_ratio": 0.3 }, "nodes": [], "triangles": [] }"#;
        assert!(matches!(parse_model(no_modulus), Err(DynelError::Input(_))));
    }

    #[test]
    fn test_unknown_triangle_node() {
        let bad = r#"{
            "metadata": { "youngs_modulus": 1.0, "poisson_ratio": 0.3 },
            "nodes": [ { "x": 0.0, "y": 0.0 }, { "x": 1.0, "y": 0.0 } ],
            "triangles": [ { "nodes": [0, 1, 2] } ]
        }"#;
        assert!(matches!(parse_model(bad), Err(DynelError::Construction(_))));
    }

    #[test]
    fn test_inverted_region() {
        let bad = r#"{
            "metadata": { "youngs_modulus": 1.0, "poisson_ratio": 0.3 },
            "nodes": [], "triangles": [],
            "boundary_conditions": {
                "oops": { "region": { "x_target_min": 2.0, "x_target_max": 1.0 }, "targets": {} }
            }
        }"#;
        assert!(matches!(parse_model(bad), Err(DynelError::Input(_))));
    }

    #[test]
    fn test_region_bounds_inclusive() {
        let region = BoundaryRegion {
            x_min: 0.0,
            x_max: 1.0,
            y_min: f64::MIN,
            y_max: 0.0,
        };
        assert!(region.contains(0.0, 0.0));
        assert!(region.contains(1.0, -5.0));
        assert!(!region.contains(1.0, 0.1));
    }
}
