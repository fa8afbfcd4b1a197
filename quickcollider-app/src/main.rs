mod config;
mod runtime;
mod scene;

use std::fs::File;
use std::path::Path;
use std::process;

use log::LevelFilter;

use config::Config;
use runtime::Runtime;

const USAGE: &str = "usage: quickcollider [-v|--verbose] <OSC port> <scene file>";

fn init_logging(level: LevelFilter, to_file: bool) {
    use simplelog::*;

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if to_file {
        let log_path = config::config_dir().join("quickcollider.log");
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match File::create(&log_path)
            .or_else(|_| File::create(std::env::temp_dir().join("quickcollider.log")))
        {
            Ok(file) => loggers.push(WriteLogger::new(level, simplelog::Config::default(), file)),
            Err(e) => eprintln!("quickcollider: no log file: {}", e),
        }
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("quickcollider: failed to initialize logger: {}", e);
    }
    log::info!("quickcollider starting (log level: {:?})", level);
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();

    let (port_arg, scene_arg) = match positional.as_slice() {
        [port, scene, ..] => (port.as_str(), scene.as_str()),
        _ => {
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };
    let port: u16 = match port_arg.parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("quickcollider: invalid OSC port '{}'\n{}", port_arg, USAGE);
            process::exit(1);
        }
    };

    let (config, problems) = Config::load();
    let level = if verbose {
        LevelFilter::Debug
    } else {
        config.log_level()
    };
    init_logging(level, config.log_to_file());
    for problem in problems {
        log::warn!(target: "config", "{}", problem);
    }

    let scene = match scene::load(Path::new(scene_arg)) {
        Ok(scene) => scene,
        Err(e) => {
            log::error!(target: "scene", "{}", e);
            eprintln!("quickcollider: {}", e);
            process::exit(1);
        }
    };

    let mut runtime = match Runtime::new(port, &config) {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!(target: "runtime", "{}", e);
            eprintln!("quickcollider: {}", e);
            process::exit(1);
        }
    };
    runtime.load_scene(scene);
    log::debug!(target: "runtime", "{} live object(s)", runtime.objects().len());
    if let Some(port) = runtime.server().port() {
        println!("quickcollider: OSC on port {}", port);
    }
    runtime.run();
}
