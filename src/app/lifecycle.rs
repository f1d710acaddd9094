use crate::Result;
use crate::cli::{ComponentArgs, InstallArgs, StartArgs};
use crate::core::diagnostics::Severity;
use crate::core::events::Event;
use crate::core::operations;
use crate::core::options::{InstallOptions, StartOptions, StopOptions, UninstallOptions};
use crate::core::outcome::PhaseOutcome;

use super::common::{Session, Target, overrides, report_diagnostics};

pub fn handle_install(args: InstallArgs, target: &Target) -> Result<()> {
    let mut session = Session::open()?;
    let load = session.load(target)?;
    let options = InstallOptions {
        components: args.target.components,
        overrides: overrides(&args.options),
    };

    let output = operations::install(&session.context(), &load.app, &options, None)?;

    report_diagnostics(&[load.diagnostics, output.diagnostics].concat());
    render_events(&output.events);
    summarize(&output.value);
    Ok(())
}

pub fn handle_start(args: StartArgs, target: &Target) -> Result<()> {
    let mut session = Session::open()?;
    let load = session.load(target)?;
    let options = StartOptions {
        components: args.target.components,
        overrides: overrides(&args.options),
    };

    let output = operations::start(&session.context(), &load.app, &options, None)?;

    report_diagnostics(&[load.diagnostics, output.diagnostics].concat());
    render_events(&output.events);
    summarize(&output.value);
    println!("{} is up at {}.", load.app.name, load.app.url);
    Ok(())
}

pub fn handle_stop(args: ComponentArgs, target: &Target) -> Result<()> {
    let mut session = Session::open()?;
    let load = session.load(target)?;
    let options = StopOptions {
        components: args.components,
    };

    let output = operations::stop(&session.context(), &load.app, &options, None)?;

    report_diagnostics(&[load.diagnostics, output.diagnostics].concat());
    render_events(&output.events);
    summarize(&output.value);
    Ok(())
}

pub fn handle_restart(args: StartArgs, target: &Target) -> Result<()> {
    let mut session = Session::open()?;
    let load = session.load(target)?;
    let options = StartOptions {
        components: args.target.components,
        overrides: overrides(&args.options),
    };

    let output = operations::restart(&session.context(), &load.app, &options, None)?;

    report_diagnostics(&[load.diagnostics, output.diagnostics].concat());
    render_events(&output.events);
    summarize(&output.value.start);
    Ok(())
}

pub fn handle_uninstall(args: ComponentArgs, target: &Target) -> Result<()> {
    let mut session = Session::open()?;
    let load = session.load(target)?;
    let options = UninstallOptions {
        components: args.components,
    };

    let output = operations::uninstall(&session.context(), &load.app, &options, None)?;

    report_diagnostics(&[load.diagnostics, output.diagnostics].concat());
    render_events(&output.events);
    summarize(&output.value);
    Ok(())
}

pub fn handle_rebuild(args: InstallArgs, target: &Target) -> Result<()> {
    let mut session = Session::open()?;
    let load = session.load(target)?;
    let options = InstallOptions {
        components: args.target.components,
        overrides: overrides(&args.options),
    };

    let output = operations::rebuild(&session.context(), &load.app, &options, None)?;

    report_diagnostics(&[load.diagnostics, output.diagnostics].concat());
    render_events(&output.events);
    summarize(&output.value.install);
    Ok(())
}

fn summarize(outcome: &PhaseOutcome) {
    let total = outcome.components.len();
    let changed = outcome.changed();
    if changed == total {
        println!("{} `{}`: {total} component(s) done.", outcome.phase, outcome.app);
    } else {
        println!(
            "{} `{}`: {changed} of {total} component(s) changed; the rest had nothing to do.",
            outcome.phase, outcome.app
        );
    }
}

pub fn render_events(events: &[Event]) {
    for event in events {
        if let Some(line) = describe_event(event) {
            match event {
                Event::Message {
                    severity: Severity::Warning,
                    ..
                } => eprintln!("Warning: {line}"),
                Event::Message {
                    severity: Severity::Error,
                    ..
                } => eprintln!("Error: {line}"),
                _ => println!("{line}"),
            }
        }
    }
}

/// One-line rendering of `event`; hook dispatch without subscribers stays silent.
pub fn describe_event(event: &Event) -> Option<String> {
    let line = match event {
        Event::Message { text, .. } => text.clone(),
        Event::PhaseStarted { app, phase } => format!("{phase} `{app}`..."),
        Event::HookDispatched {
            event,
            component,
            subscribers,
        } => {
            if *subscribers == 0 {
                return None;
            }
            match component {
                Some(component) => {
                    format!("→ {component}: {event} ({subscribers} hook(s)).")
                }
                None => format!("→ {event} ({subscribers} hook(s))."),
            }
        }
        Event::AppRegistered { app, dir } => {
            format!("→ {app}: registered {}.", dir.display())
        }
        Event::ImageBuilt { component, image } => format!("→ {component}: built image {image}."),
        Event::ContainerCreated {
            component,
            container_id,
        } => format!("→ {component}: created container {}.", short_id(container_id)),
        Event::IdentityRecorded { component, path } => {
            format!("→ {component}: recorded identity at {}.", path.display())
        }
        Event::ContainerStarted {
            component,
            container_id,
        } => format!("→ {component}: started {}.", short_id(container_id)),
        Event::ContainerStopped {
            component,
            container_id,
        } => format!("→ {component}: stopped {}.", short_id(container_id)),
        Event::ContainerRemoved {
            component,
            container_id,
        } => format!("→ {component}: removed {}.", short_id(container_id)),
        Event::IdentityCleared {
            component,
            existed,
            ..
        } => {
            if !existed {
                return None;
            }
            format!("→ {component}: forgot container identity.")
        }
        Event::ComponentSkipped { component, phase } => {
            format!("→ {component}: not installed; nothing to {phase}.")
        }
        Event::PhaseCompleted {
            app,
            phase,
            failures,
        } => {
            if *failures == 0 {
                return None;
            }
            format!("{phase} `{app}`: {failures} component(s) failed.")
        }
    };
    Some(line)
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
