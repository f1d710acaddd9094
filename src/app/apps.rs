use std::io::{self, IsTerminal};
use std::path::Path;

use crate::cli::RegisterArgs;
use crate::core::assembly::App;
use crate::core::discovery::Discovery;
use crate::core::identity;
use crate::core::project::resolve_config_path;
use crate::core::registry::AppRegistry;
use crate::Result;

use super::common::{Session, Target, emit_diagnostics, report_diagnostics};
use super::display::colorize;

pub fn handle_apps() -> Result<()> {
    let session = Session::open()?;
    emit_diagnostics(&session.global_diagnostics());

    let apps = AppRegistry::new(&session.discovery, &session.loader).list()?;
    if apps.is_empty() {
        println!("No apps registered. Run `kbox install` or `kbox register` inside an app.");
        return Ok(());
    }

    let width = apps.iter().map(|app| app.name.len()).max().unwrap_or(4).max(4);
    println!("{:<width$}  {:<28}  ROOT", "NAME", "URL");
    for app in &apps {
        println!(
            "{:<width$}  {:<28}  {}",
            app.name,
            app.url,
            app.app_root.display()
        );
    }
    Ok(())
}

pub fn handle_info(target: &Target) -> Result<()> {
    let mut session = Session::open()?;
    let load = session.load(target)?;
    report_diagnostics(&load.diagnostics);
    print_info(&load.app, io::stdout().is_terminal());
    Ok(())
}

pub fn handle_register(args: RegisterArgs, target: &Target) -> Result<()> {
    let session = Session::open()?;
    let dir = match args.dir {
        Some(dir) => dir,
        None => {
            let config = resolve_config_path(target.config.as_deref(), None)?;
            config
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config.clone())
        }
    };

    session.discovery.register_app_dir(&dir)?;
    println!(
        "Registered {} in {}.",
        dir.display(),
        session.discovery.path().display()
    );
    Ok(())
}

fn print_info(app: &App, color: bool) {
    println!("App: {} ({})", app.name, app.config.file_path.display());
    println!("URL: {}", app.url);
    println!("Root: {} (bound as {})", app.app_root.display(), app.root_bind);
    if !app.config.plugins.is_empty() {
        println!("Plugins: {}", app.config.plugins.join(", "));
    }
    println!();

    let rows: Vec<[String; 4]> = app
        .components_ordered()
        .into_iter()
        .map(|entry| {
            let component = entry.descriptor(app);
            let container = identity::read(&component.identity_path)
                .ok()
                .flatten()
                .map(|id| id.get(..12).unwrap_or(&id).to_string());
            let state = match container {
                Some(id) => colorize(&id, "32", color),
                None => colorize("not installed", "33", color),
            };
            [
                component.name.clone(),
                component.image.name.clone(),
                component.hostname.clone(),
                state,
            ]
        })
        .collect();

    let widths = [
        column_width(&rows, 0, "COMPONENT"),
        column_width(&rows, 1, "IMAGE"),
        column_width(&rows, 2, "HOSTNAME"),
    ];
    println!(
        "{:<w0$}  {:<w1$}  {:<w2$}  CONTAINER",
        "COMPONENT",
        "IMAGE",
        "HOSTNAME",
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2]
    );
    for [name, image, hostname, state] in &rows {
        println!(
            "{name:<w0$}  {image:<w1$}  {hostname:<w2$}  {state}",
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2]
        );
    }
}

fn column_width(rows: &[[String; 4]], column: usize, header: &str) -> usize {
    rows.iter()
        .map(|row| row[column].len())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(header.len())
}
