use alsamidi::{
    cli::{
        find_device, monitor_spinner, pick_device, run_list, run_monitor, run_probe, run_send,
        Args, CliError, Command,
    },
    logging, AlsaRouter, Settings,
};
use clap::Parser;
use std::io;

fn main() {
    let args = Args::parse();
    let settings = load_settings(&args);
    initialize_logging(&settings);

    let router = AlsaRouter::new(&settings.sequencer, &settings.client_name);
    if let Err(e) = run(&args.command, &router, &settings) {
        let error_msg = format!("Error: {}", e);
        log::error!("{}", error_msg);
        eprintln!("{}", error_msg);
        std::process::exit(1);
    }
}

fn load_settings(args: &Args) -> Settings {
    match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn initialize_logging(settings: &Settings) {
    // the level was validated when the settings were loaded
    let level = settings
        .log_level_filter()
        .unwrap_or(log::LevelFilter::Info);
    if let Err(e) = logging::init_logger(level) {
        eprintln!("Warning: logging disabled: {}", e);
    }
    log::info!("Application starting");
}

fn run(command: &Command, router: &AlsaRouter, settings: &Settings) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    match command {
        Command::List { all } => {
            run_list(router, *all, &mut stdout)?;
        }
        Command::Probe { addr } => run_probe(router, *addr, &mut stdout)?,
        Command::Send { addr, bytes } => {
            run_send(router, *addr, bytes, &settings.port_name, &mut stdout)?
        }
        Command::Monitor { addr, count } => {
            let mut device = match addr {
                Some(addr) => find_device(router, *addr)?,
                None => pick_device(router)?,
            };
            device.set_local_port_name(settings.port_name.as_str());
            let spinner = monitor_spinner();
            run_monitor(
                &mut device,
                *count,
                settings.poll_interval(),
                &mut stdout,
                &spinner,
            )?;
        }
    }
    Ok(())
}
