use std::{path::Path, time::Instant};

use anyhow::{bail, Context};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{error, info, LevelFilter};

use crate::{
    io_system::{BodyStatesRecording, MeshRecordingToPlt, ReloadParticleIo, RestartIo},
    neighborhood_check::{check_contact_configuration, check_inner_configuration},
    simulation_parameters::SimulationParams,
    sph_kernels::{DimensionUtils, DimensionUtils2d, DimensionUtils3d},
    BodyRelation, KernelSelection, SphResult, SphSystem,
};

use super::vtk_exporter::BodyStatesRecordingToVtk;

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

pub fn start() {
    let overwrite_arg = Arg::with_name("OVERWRITE_CONFIG_FILE")
        .long("overwrite-config-file")
        .short("c")
        .required(false)
        .takes_value(true)
        .help("Overwrite config");

    let matches = App::new("SPH Cell Linked Lists")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run the rebuild cycles of a scene with prescribed particle motion")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(overwrite_arg.clone())
                .arg(
                    Arg::with_name("MAX_STEPS")
                        .long("max-steps")
                        .short("n")
                        .required(false)
                        .takes_value(true)
                        .help("Stop after the given number of steps"),
                )
                .arg(
                    Arg::with_name("RESTART_STEP")
                        .long("restart-step")
                        .short("r")
                        .required(false)
                        .takes_value(true)
                        .help("Continue from the restart files written at this step"),
                )
                .arg(
                    Arg::with_name("CHECK_NEIGHBORHOOD")
                        .long("check-neighborhood")
                        .short("k")
                        .takes_value(false)
                        .help("Verify every rebuild against an R*-tree search (slow)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("Build all neighbor configurations once and verify them against an R*-tree search")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(overwrite_arg),
        )
        .get_matches();

    let level = match matches.occurrences_of("v") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    if let Err(e) = run_subcommand(&matches) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_params(matches: &ArgMatches) -> anyhow::Result<SimulationParams> {
    let parameter_file = matches
        .value_of("SIMULATION_CONFIG")
        .context("missing simulation config")?;
    let overwrite = matches.value_of("OVERWRITE_CONFIG_FILE").map(Path::new);
    let params = SimulationParams::load(Path::new(parameter_file), overwrite)
        .with_context(|| format!("failed loading simulation config '{}'", parameter_file))?;
    info!("{:?}", params);
    Ok(params)
}

fn run_subcommand(matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(run_matches) = matches.subcommand_matches("run") {
        let mut params = load_params(run_matches)?;
        if run_matches.is_present("CHECK_NEIGHBORHOOD") {
            params.check_neighborhood = true;
        }
        let max_steps = run_matches
            .value_of("MAX_STEPS")
            .map(|x| x.parse::<usize>())
            .transpose()
            .context("--max-steps has to be a non-negative integer")?;
        let restart_step = run_matches
            .value_of("RESTART_STEP")
            .map(|x| x.parse::<usize>())
            .transpose()
            .context("--restart-step has to be a non-negative integer")?;

        match params.dimensions {
            2 => run_simulation::<DimensionUtils2d, 2>(&params, max_steps, restart_step),
            3 => run_simulation::<DimensionUtils3d, 3>(&params, max_steps, restart_step),
            d => bail!("unsupported number of dimensions {}", d),
        }
    } else if let Some(check_matches) = matches.subcommand_matches("check") {
        let mut params = load_params(check_matches)?;
        params.check_neighborhood = true;
        match params.dimensions {
            2 => run_simulation::<DimensionUtils2d, 2>(&params, Some(0), None),
            3 => run_simulation::<DimensionUtils3d, 3>(&params, Some(0), None),
            d => bail!("unsupported number of dimensions {}", d),
        }
    } else {
        unreachable!()
    }
}

/// Rebuilds cell lists and all configurations, optionally verifying them.
fn rebuild<DU: DimensionUtils<D>, const D: usize>(
    system: &mut SphSystem<DU, D>,
    relations: &mut [BodyRelation<D>],
    check_neighborhood: bool,
) -> SphResult<()> {
    system.update_cell_lists()?;
    for relation in relations.iter_mut() {
        relation.update_configuration(system)?;
    }
    if check_neighborhood {
        check_relations(system, relations)?;
    }
    Ok(())
}

fn check_relations<DU: DimensionUtils<D>, const D: usize>(
    system: &SphSystem<DU, D>,
    relations: &[BodyRelation<D>],
) -> SphResult<()> {
    for relation in relations {
        let origin = system.body(relation.body());

        if let Some(inner) = relation.inner() {
            check_inner_configuration(
                &origin.particles().position,
                origin.kernel().cutoff_radius(),
                &inner.configuration,
            )?;
        }

        if let Some(contact) = relation.contact() {
            for (&target, configuration) in contact.contact_bodies().iter().zip(&contact.configurations) {
                let target = system.body(target);
                let cutoff_radius = contact
                    .policy()
                    .choose(origin.kernel(), target.kernel())
                    .cutoff_radius();
                check_contact_configuration(
                    &origin.particles().position,
                    &target.particles().position,
                    cutoff_radius,
                    configuration,
                )?;
            }
        }
    }
    info!("=====> neighborhood check passed <=====");
    Ok(())
}

fn log_neighbor_statistics<DU: DimensionUtils<D>, const D: usize>(
    system: &SphSystem<DU, D>,
    relations: &[BodyRelation<D>],
) {
    for relation in relations {
        let body = system.body(relation.body());
        let n = body.number_of_particles().max(1) as f64;
        if let Some(inner) = relation.inner() {
            info!(
                "'{}': {:.2} inner neighbors per particle",
                body.name(),
                inner.configuration.total_relations() as f64 / n
            );
        }
        if let Some(contact) = relation.contact() {
            for (&target, configuration) in contact.contact_bodies().iter().zip(&contact.configurations) {
                info!(
                    "'{}' -> '{}': {:.2} contact neighbors per particle",
                    body.name(),
                    system.body(target).name(),
                    configuration.total_relations() as f64 / n
                );
            }
        }
    }
}

fn run_simulation<DU: DimensionUtils<D>, const D: usize>(
    params: &SimulationParams,
    max_steps: Option<usize>,
    restart_step: Option<usize>,
) -> anyhow::Result<()> {
    let (mut system, mut relations) = params.build_system::<DU, D>()?;

    let mut vtk_recording = BodyStatesRecordingToVtk::new(params.output_folder.join("vtk"));
    let mut mesh_recording = MeshRecordingToPlt::new(params.output_folder.join("mesh"));
    let mut restart_recording = RestartIo::new(params.output_folder.join("restart"));
    let mut reload_recording = ReloadParticleIo::new(params.output_folder.join("reload"));

    if let Some(restart_step) = restart_step {
        system.context = restart_recording
            .read_from_file(system.bodies_mut(), restart_step)
            .with_context(|| format!("failed reading restart files of step {}", restart_step))?;
    }
    system.log_summary();

    rebuild(&mut system, &mut relations, params.check_neighborhood).context("initial rebuild failed")?;
    log_neighbor_statistics(&system, &relations);
    if params.output_interval > 0 {
        vtk_recording.write_to_file(system.bodies(), &system.context)?;
        mesh_recording.write_to_file(system.bodies(), &system.context)?;
    }

    let first_step = system.context.iteration + 1;
    let number_of_steps = match max_steps {
        Some(max_steps) => (system.context.iteration + max_steps).min(params.number_of_steps()),
        None => params.number_of_steps(),
    };

    let mut total_rebuild_secs = 0.;
    let mut number_of_rebuilds = 0;

    for step in first_step..=number_of_steps {
        for body in system.bodies_mut() {
            body.advance_positions(params.time_step);
        }
        system.advance_time(params.time_step);

        if step % params.rebuild_interval == 0 {
            let a = Instant::now();
            rebuild(&mut system, &mut relations, params.check_neighborhood)
                .with_context(|| format!("rebuild at step {} failed", step))?;
            total_rebuild_secs += a.elapsed().as_secs_f64();
            number_of_rebuilds += 1;
        }

        if params.output_interval > 0 && step % params.output_interval == 0 {
            info!(
                "{:05}: t = {} ({:.3} msec per rebuild AVG)",
                step,
                system.context.physical_time,
                1000. * total_rebuild_secs / number_of_rebuilds.max(1) as f64
            );
            log_neighbor_statistics(&system, &relations);
            vtk_recording.write_to_file(system.bodies(), &system.context)?;
            mesh_recording.write_to_file(system.bodies(), &system.context)?;
        }

        if params.restart_interval > 0 && step % params.restart_interval == 0 {
            restart_recording.write_to_file(system.bodies(), &system.context)?;
        }
    }

    if params.output_interval > 0 {
        reload_recording.write_to_file(system.bodies(), &system.context)?;
    }

    info!(
        "finished at step {} with {} rebuilds at t = {}",
        system.context.iteration, number_of_rebuilds, system.context.physical_time
    );
    Ok(())
}
