use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dynel::{input, post_processor, restore, DynelResult, GaussSeidel, NoDelay, SleepPacer};

/// Relaxes a triangulated cross-section and writes displacement, stress and
/// fracture risk results
#[derive(Parser, Debug)]
#[command(name = "dynel", version, about)]
struct Cli {
    /// Json model file
    input: String,

    /// Output csv for nodal results
    #[arg(long, default_value = "nodes.csv")]
    nodes_output: String,

    /// Output csv for element results
    #[arg(long, default_value = "elements.csv")]
    elements_output: String,

    /// Also write the export snapshot as json
    #[arg(long)]
    json_output: Option<String>,

    /// Internal friction angle in degrees for the MCSS column
    #[arg(long, default_value_t = 30.0)]
    friction_angle: f64,

    /// Pace steps like the interactive viewer, at this animation speed
    #[arg(long)]
    animate: Option<f64>,
}

fn run(cli: &Cli) -> DynelResult<()> {
    let model = input::run(&cli.input)?;
    let mut mesh = model.mesh;
    let mut solver = GaussSeidel::new(model.solver_config)?;

    let max_iterations = solver.config().max_iterations as u64;
    let bar = ProgressBar::new(max_iterations);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} iterations {msg}") {
        bar.set_style(style);
    }

    let on_update = |_: &dynel::Mesh| {};
    let on_status = |result: &dynel::StepResult| {
        bar.set_position(result.iterations as u64);
        bar.set_message(format!("error {:.3e}", result.error));
    };
    let speed = cli.animate.unwrap_or(1.0);

    let result = match &model.restoration {
        Some(restoration) => {
            restore(
                &mut mesh,
                &mut solver,
                &restoration.target_nodes,
                restoration.target_y,
            )?;
            match cli.animate {
                Some(_) => solver.drive(&mut mesh, on_update, on_status, speed, &mut SleepPacer)?,
                None => solver.drive(&mut mesh, on_update, on_status, speed, &mut NoDelay)?,
            }
        }
        None => match cli.animate {
            Some(_) => solver.solve(&mut mesh, on_update, on_status, speed, &mut SleepPacer)?,
            None => solver.solve(&mut mesh, on_update, on_status, speed, &mut NoDelay)?,
        },
    };
    bar.finish();

    match result {
        Some(result) if result.converged => {
            info!(iterations = result.iterations, "solve complete")
        }
        Some(result) => info!(
            iterations = result.iterations,
            error = result.error,
            "solve did not converge"
        ),
        None => info!("nothing to solve"),
    }

    let mcss = mesh.calculate_mcss(cli.friction_angle);
    post_processor::csv_output(&mesh, &mcss, &cli.nodes_output, &cli.elements_output)?;

    if let Some(json_output) = &cli.json_output {
        post_processor::json_output(&mesh.export_results(), json_output)?;
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1);
    }
}
