use std::collections::HashMap;

use clap::{App, AppSettings, Arg, SubCommand};

use grid_sph::{floating_type_mod::FT, simulation_parameters::SimulationParams, write_statistics, FluidSimulation};

const CARGO_PKG_VERSION: &'static str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &'static str = env!("CARGO_PKG_DESCRIPTION");

fn main() {
    let matches = App::new("Grid SPH Simulation")
        .version(CARGO_PKG_VERSION)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("run")
                .about("Run a headless simulation with the given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("YAML file with the simulation parameters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("STEPS")
                        .long("steps")
                        .short("n")
                        .takes_value(true)
                        .default_value("600")
                        .help("Number of simulation steps to run"),
                )
                .arg(
                    Arg::with_name("DT")
                        .long("dt")
                        .takes_value(true)
                        .help("Fixed timestep in seconds (default 1/60)"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("YAML file whose top-level keys overwrite the simulation config"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual step phases")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .required(false)
                        .takes_value(true)
                        .help("Where to write statistics to"),
                ),
        )
        .subcommand(
            SubCommand::with_name("print-default-config")
                .about("Print the default simulation parameters as YAML"),
        )
        .get_matches();

    if let Some(run_matches) = matches.subcommand_matches("run") {
        let parameter_file = run_matches
            .value_of("SIMULATION_CONFIG")
            .expect("missing simulation config");
        let params_yaml = std::fs::read_to_string(parameter_file).expect("failed reading parameter file");
        let mut simulation_params_serde: serde_yaml::Value =
            serde_yaml::from_str(&params_yaml).expect("failed parsing simulation config file");

        if let Some(overwrite_value_config) = run_matches.value_of("OVERWRITE_CONFIG_FILE") {
            let overwrite_config_str =
                std::fs::read_to_string(overwrite_value_config).expect("failed reading overwrite config file");
            let overwrite_config_file: HashMap<String, serde_yaml::Value> =
                serde_yaml::from_str(&overwrite_config_str).expect("failed parsing overwrite config file");
            for (k, v) in overwrite_config_file.into_iter() {
                let mapping = simulation_params_serde
                    .as_mapping_mut()
                    .expect("cannot get parsed simulation parameters as mapping");
                *mapping
                    .get_mut(&serde_yaml::Value::String(k.clone()))
                    .unwrap_or_else(|| panic!("not able to find attribute {}", k)) = v;
            }
        }

        let simulation_params: SimulationParams =
            serde_yaml::from_value(simulation_params_serde).expect("failed to unpack SimulationParams");
        println!("{:?}", simulation_params);

        let num_steps: usize = run_matches
            .value_of("STEPS")
            .unwrap()
            .parse()
            .expect("STEPS must be a number");
        let dt: FT = run_matches
            .value_of("DT")
            .map(|x| x.parse().expect("DT must be a number"))
            .unwrap_or(1. / 60.);

        let counters_enabled = run_matches.is_present("STATISTICS_ENABLED");
        let statistics_path_opt = run_matches.value_of("STATISTICS_PATH").map(String::from);

        let mut fluid_simulation = match FluidSimulation::with_counters(simulation_params, counters_enabled) {
            Ok(sim) => sim,
            Err(err) => {
                eprintln!("invalid configuration: {}", err);
                std::process::exit(1);
            }
        };

        for step in 0..num_steps {
            fluid_simulation.step(dt);

            if step % 60 == 0 {
                let densities = fluid_simulation.densities();
                let avg_density = densities.iter().cloned().sum::<FT>() / densities.len() as FT;
                println!(
                    "step {:>6} time {:>8.3}s avg-density {:.4}",
                    fluid_simulation.step_number(),
                    fluid_simulation.time(),
                    avg_density
                );
            }
        }

        let s = write_statistics(&fluid_simulation);
        print!("{}", s);
        if let Some(statistics_path) = statistics_path_opt {
            std::fs::write(statistics_path, s).expect("failed writing statistics file");
        }
    } else if matches.subcommand_matches("print-default-config").is_some() {
        let yaml = serde_yaml::to_string(&SimulationParams::default()).expect("failed serializing default config");
        print!("{}", yaml);
    } else {
        unreachable!()
    }
}
