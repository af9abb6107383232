use clap::{Arg, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use libmaps_exchange::config::Config;
use libmaps_exchange::converter::{convert_directory, convert_file};
use libmaps_exchange::mapping::MappingTable;
use libmaps_exchange::stack::stack_directory;
use libmaps_exchange::worker_status::ProgressStatus;

const LOG_FILE: &str = "./maps_exchange.log";

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Library messages go to a log file, the CLI's own messages go to the terminal
fn init_file_log() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from(LOG_FILE))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn load_config(matches: &ArgMatches) -> Option<Config> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            log::info!("Loading config from {}...", path);
            match Config::read_config_file(Path::new(path)) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("{e}");
                    return None;
                }
            }
        }
        None => {
            log::info!("No config given, using the default conventions.");
            Config::default()
        }
    };
    match &config.mapping_path {
        Some(p) => log::info!("Mapping table: {}", p.to_string_lossy()),
        None => log::info!("Mapping table: bundled default"),
    }
    log::info!("SDE suffix: {}", config.sde_suffix);
    Some(config)
}

fn load_table(config: &Config) -> Option<MappingTable> {
    match MappingTable::new(config.mapping_path.as_deref()) {
        Ok(table) => {
            log::info!("Loaded {} mapping entries.", table.len());
            Some(table)
        }
        Err(e) => {
            log::error!("Could not load the mapping table: {e}");
            None
        }
    }
}

fn progress_bar(pb_manager: &MultiProgress) -> ProgressBar {
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}") {
        pb.set_style(style);
    }
    pb
}

fn update_bar(pb: &ProgressBar, status: ProgressStatus) {
    pb.set_position((status.progress * 100.0) as u64);
    let name = status
        .file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    pb.set_message(format!("{:?} {}", status.phase, name));
}

fn run_convert(config: &Config, file: &Path) -> bool {
    let Some(table) = load_table(config) else {
        return false;
    };
    log::info!("Converting {}...", file.display());
    match convert_file(file, &table, config) {
        Ok(sde_path) => {
            log::info!("Wrote {}", sde_path.display());
            true
        }
        Err(e) => {
            log::error!("Conversion failed with error: {e}");
            false
        }
    }
}

fn run_convert_dir(config: &Config, dir: &Path, pb_manager: &MultiProgress) -> bool {
    let Some(table) = load_table(config) else {
        return false;
    };
    let pb = progress_bar(pb_manager);
    let result = convert_directory(dir, &table, config, |status| {
        log::info!("Handled {}", status.file.display());
        update_bar(&pb, status);
    });
    pb.finish();

    match result {
        Ok(report) => {
            log::info!("Converted {} files.", report.converted.len());
            if report.is_success() {
                return true;
            }
            log::warn!("{} files failed to convert:", report.failed.len());
            for (path, e) in report.failed.iter() {
                log::warn!("  {}: {}", path.display(), e);
            }
            false
        }
        Err(e) => {
            log::error!("Batch conversion failed with error: {e}");
            false
        }
    }
}

fn run_stack(
    config: &Config,
    input_dir: &Path,
    output: &Path,
    pb_manager: &MultiProgress,
) -> bool {
    let pb = progress_bar(pb_manager);
    let result = stack_directory(input_dir, output, config, |status| update_bar(&pb, status));
    pb.finish();

    match result {
        Ok(summary) => {
            log::info!(
                "Stacked {} files taken from {:?} to {:?} degrees.",
                summary.depth,
                summary.angles.first(),
                summary.angles.last()
            );
            for (group, shape) in summary.groups.iter() {
                log::info!("  {group}: slice shape {shape}");
            }
            log::info!("Wrote {}", output.display());
            true
        }
        Err(e) => {
            log::error!("Stacking failed with error: {e}");
            false
        }
    }
}

fn main() -> ExitCode {
    // Create a cli
    let matches = Command::new("maps_exchange_cli")
        .about("Convert MAPS files to Scientific Data Exchange and assemble theta stacks")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .help("Path to a configuration yaml file"),
        )
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(
                    Arg::new("path")
                        .short('p')
                        .long("path")
                        .required(true)
                        .help("Path to the file"),
                ),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert a single MAPS file")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .required(true)
                        .help("Path to the MAPS file"),
                ),
        )
        .subcommand(
            Command::new("convert-dir")
                .about("Convert every MAPS file in a directory")
                .arg(
                    Arg::new("dir")
                        .short('d')
                        .long("dir")
                        .required(true)
                        .help("Path to the directory"),
                ),
        )
        .subcommand(
            Command::new("stack")
                .about("Merge the SDE files of a directory into a theta stack")
                .arg(
                    Arg::new("input_dir")
                        .required(true)
                        .help("Directory of single projection SDE files"),
                )
                .arg(
                    Arg::new("output")
                        .required(true)
                        .help("Path of the stacked file"),
                ),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = init_file_log() {
        log::warn!("Could not create the log file {LOG_FILE}: {e}");
    }

    if let Some(("new", sub)) = matches.subcommand() {
        let Some(path) = sub.get_one::<String>("path") else {
            return ExitCode::FAILURE;
        };
        log::info!("Making a template config at {}...", path);
        return match make_template_config(Path::new(path)) {
            Ok(()) => {
                log::info!("Done.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("Could not write the template config: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let Some(config) = load_config(&matches) else {
        return ExitCode::FAILURE;
    };
    spdlog::info!("Starting maps_exchange_cli");

    let success = match matches.subcommand() {
        Some(("convert", sub)) => match sub.get_one::<String>("file") {
            Some(file) => run_convert(&config, Path::new(file)),
            None => false,
        },
        Some(("convert-dir", sub)) => match sub.get_one::<String>("dir") {
            Some(dir) => run_convert_dir(&config, Path::new(dir), &pb_manager),
            None => false,
        },
        Some(("stack", sub)) => {
            match (
                sub.get_one::<String>("input_dir"),
                sub.get_one::<String>("output"),
            ) {
                (Some(input_dir), Some(output)) => run_stack(
                    &config,
                    Path::new(input_dir),
                    Path::new(output),
                    &pb_manager,
                ),
                _ => false,
            }
        }
        _ => false,
    };

    log::info!("Done.");
    if success {
        ExitCode::SUCCESS
    } else {
        log::warn!("Check {LOG_FILE} for details.");
        ExitCode::FAILURE
    }
}
