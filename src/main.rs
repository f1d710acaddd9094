use std::process::ExitCode;

use clap::{CommandFactory, Parser, error::ErrorKind};

use kbox::app;
use kbox::app::common::Target;
use kbox::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(64),
            };
        }
    };

    let Cli {
        config,
        app: app_name,
        verbose,
        command,
    } = cli;

    app::logging::init(verbose);

    let command = match command {
        Some(cmd) => cmd,
        None => {
            let mut command = Cli::command();
            let _ = command.print_help();
            println!();
            return ExitCode::from(64);
        }
    };

    let target = Target {
        config,
        app: app_name,
    };

    let result = match command {
        Commands::Install(args) => app::handle_install(args, &target),
        Commands::Start(args) => app::handle_start(args, &target),
        Commands::Stop(args) => app::handle_stop(args, &target),
        Commands::Restart(args) => app::handle_restart(args, &target),
        Commands::Uninstall(args) => app::handle_uninstall(args, &target),
        Commands::Rebuild(args) => app::handle_rebuild(args, &target),
        Commands::Apps => app::handle_apps(),
        Commands::Info => app::handle_info(&target),
        Commands::Register(args) => app::handle_register(args, &target),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            app::error::exit_code(&err)
        }
    }
}
