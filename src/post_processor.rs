use std::{collections::BTreeMap, io::Write};

use tracing::info;

use crate::{
    datatypes::ExportResults,
    error::{DynelError, DynelResult},
    mesh::Mesh,
};

fn create_file(path: &str) -> DynelResult<std::fs::File> {
    std::fs::File::create(path)
        .map_err(|err| DynelError::PostProcessor(format!("Failed to create {path}: {err}")))
}

fn write_error(path: &str, err: std::io::Error) -> DynelError {
    DynelError::PostProcessor(format!("Failed to write {path}: {err}"))
}

/// Writes nodal results as csv
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `out` - Destination of the csv rows
pub fn write_nodes_csv<W: Write>(mesh: &Mesh, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "id,x,y,ux,uy,fx,fy")?;
    for node in mesh.get_nodes() {
        writeln!(
            out,
            "{id},{x},{y},{ux},{uy},{fx},{fy}",
            id = node.id,
            x = node.position.x,
            y = node.position.y,
            ux = node.displacement.x,
            uy = node.displacement.y,
            fx = node.force.x,
            fy = node.force.y,
        )?;
    }
    Ok(())
}

/// Writes element stress and MCSS as csv
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `mcss` - Maximum Coulomb shear stress per element id
/// * `out` - Destination of the csv rows
pub fn write_elements_csv<W: Write>(
    mesh: &Mesh,
    mcss: &BTreeMap<usize, f64>,
    out: &mut W,
) -> std::io::Result<()> {
    writeln!(out, "id,n0,n1,n2,sxx,syy,txy,mcss")?;
    for element in mesh.get_triangles() {
        let [n0, n1, n2] = element.node_ids();
        let stress = element.stress(mesh.get_nodes());
        writeln!(
            out,
            "{id},{n0},{n1},{n2},{sxx},{syy},{txy},{mcss}",
            id = element.id,
            sxx = stress[0],
            syy = stress[1],
            txy = stress[2],
            mcss = mcss.get(&element.id).copied().unwrap_or(f64::NAN),
        )?;
    }
    Ok(())
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `mcss` - Maximum Coulomb shear stress per element id
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    mesh: &Mesh,
    mcss: &BTreeMap<usize, f64>,
    nodes_output: &str,
    elements_output: &str,
) -> DynelResult<()> {
    let mut nodes_file = create_file(nodes_output)?;
    let mut elements_file = create_file(elements_output)?;

    write_nodes_csv(mesh, &mut nodes_file).map_err(|err| write_error(nodes_output, err))?;
    write_elements_csv(mesh, mcss, &mut elements_file)
        .map_err(|err| write_error(elements_output, err))?;

    info!("wrote output to {} and {}", nodes_output, elements_output);

    Ok(())
}

/// Writes the export snapshot as pretty printed json
pub fn json_output(results: &ExportResults, output: &str) -> DynelResult<()> {
    let file = create_file(output)?;
    serde_json::to_writer_pretty(file, results)
        .map_err(|err| DynelError::PostProcessor(format!("Failed to write {output}: {err}")))?;

    info!("wrote snapshot to {}", output);

    Ok(())
}
