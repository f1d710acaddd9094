//! Lifecycle transitions: install, start, stop, uninstall, and their compositions.
//!
//! Each primitive phase runs the same template: readiness check, `pre-<phase>` hook, the
//! per-component batch (each unit wrapped in `pre-<phase>-component` and
//! `post-<phase>-component`), then `post-<phase>`. Start and stop report every component
//! failure; install and uninstall report the first one.

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::{DATA_COMPONENT, OptionMap};
use crate::error::{Error, Result};

use super::assembly::{App, AppComponent, CODE_MOUNT};
use super::batch::{self, BatchReport, EventSink};
use super::component::Component;
use super::diagnostics::{Diagnostic, Severity};
use super::discovery::Discovery;
use super::engine::{BuildRequest, Engine};
use super::events::{Event, Phase};
use super::hooks::{HookBus, HookPayload};
use super::identity;
use super::options::{InstallOptions, StartOptions, StopOptions, UninstallOptions};
use super::outcome::{
    ComponentOutcome, OperationOutput, OperationResult, PhaseOutcome, RebuildOutcome,
    RestartOutcome,
};
use super::reporter::Reporter;
use super::services::ServiceReadiness;

/// Collaborators every transition needs, constructed once and passed by reference.
#[derive(Clone, Copy)]
pub struct LifecycleContext<'a> {
    /// Container runtime.
    pub engine: &'a dyn Engine,
    /// Checked before each primitive phase.
    pub services: &'a dyn ServiceReadiness,
    /// Install registers the app directory here.
    pub discovery: &'a dyn Discovery,
    /// Subscribers notified around every phase and component.
    pub hooks: &'a HookBus,
}

impl<'a> LifecycleContext<'a> {
    pub fn new(
        engine: &'a dyn Engine,
        services: &'a dyn ServiceReadiness,
        discovery: &'a dyn Discovery,
        hooks: &'a HookBus,
    ) -> Self {
        Self {
            engine,
            services,
            discovery,
            hooks,
        }
    }
}

/// Create and record a container for every selected component.
///
/// The data component is installed alone first; the first component failure is returned.
pub fn install(
    ctx: &LifecycleContext<'_>,
    app: &App,
    options: &InstallOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<PhaseOutcome> {
    run_phase(
        ctx,
        app,
        Phase::Install,
        &options.components,
        reporter,
        |reporter| {
            ctx.discovery.register_app_dir(&app.app_root)?;
            reporter.emit(Event::AppRegistered {
                app: app.name.clone(),
                dir: app.app_root.clone(),
            });
            Ok(())
        },
        |component, sink| install_component(ctx, app, component, &options.overrides, sink),
    )
}

/// Start the recorded container of every selected component, aggregating failures.
pub fn start(
    ctx: &LifecycleContext<'_>,
    app: &App,
    options: &StartOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<PhaseOutcome> {
    run_phase(
        ctx,
        app,
        Phase::Start,
        &options.components,
        reporter,
        |_| Ok(()),
        |component, sink| start_component(ctx, app, component, &options.overrides, sink),
    )
}

/// Stop every selected component that has a recorded container, aggregating failures.
pub fn stop(
    ctx: &LifecycleContext<'_>,
    app: &App,
    options: &StopOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<PhaseOutcome> {
    run_phase(
        ctx,
        app,
        Phase::Stop,
        &options.components,
        reporter,
        |_| Ok(()),
        |component, sink| stop_component(ctx, app, component, sink),
    )
}

/// Remove every selected component's container and forget its identity.
///
/// The first component failure is returned.
pub fn uninstall(
    ctx: &LifecycleContext<'_>,
    app: &App,
    options: &UninstallOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<PhaseOutcome> {
    run_phase(
        ctx,
        app,
        Phase::Uninstall,
        &options.components,
        reporter,
        |_| Ok(()),
        |component, sink| uninstall_component(ctx, app, component, sink),
    )
}

/// Stop, then start. A failed stop is returned without attempting the start.
pub fn restart(
    ctx: &LifecycleContext<'_>,
    app: &App,
    options: &StartOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<RestartOutcome> {
    let mut events = Vec::new();
    let mut reporter = ReporterProxy::new(reporter, &mut events);

    let stopped = stop(ctx, app, &StopOptions::from(options), Some(&mut reporter))?;
    let started = start(ctx, app, options, Some(&mut reporter))?;

    let mut diagnostics = stopped.diagnostics;
    diagnostics.extend(started.diagnostics);

    Ok(OperationOutput::new(RestartOutcome {
        stop: stopped.value,
        start: started.value,
    })
    .with_diagnostics(diagnostics)
    .with_events(events))
}

/// Stop, uninstall, then install from scratch, forwarding the first failure of any step.
///
/// The data component is treated like every other component: unless `options.components`
/// leaves it out, its container and identity record are removed and recreated.
pub fn rebuild(
    ctx: &LifecycleContext<'_>,
    app: &App,
    options: &InstallOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<RebuildOutcome> {
    let mut events = Vec::new();
    let mut reporter = ReporterProxy::new(reporter, &mut events);

    let stopped = stop(ctx, app, &StopOptions::from(options), Some(&mut reporter))
        .map_err(first_failure)?;
    let removed = uninstall(
        ctx,
        app,
        &UninstallOptions::from(options),
        Some(&mut reporter),
    )?;
    let installed = install(ctx, app, options, Some(&mut reporter))?;

    let mut diagnostics = stopped.diagnostics;
    diagnostics.extend(removed.diagnostics);
    diagnostics.extend(installed.diagnostics);

    Ok(OperationOutput::new(RebuildOutcome {
        stop: stopped.value,
        uninstall: removed.value,
        install: installed.value,
    })
    .with_diagnostics(diagnostics)
    .with_events(events))
}

/// Create options for `component`: computed values, then the component's declared
/// `install` table, then caller overrides.
pub fn install_options(app: &App, component: &Component, overrides: &OptionMap) -> OptionMap {
    let mut options = OptionMap::new();
    options.insert("Hostname".into(), json!(component.hostname));
    options.insert("name".into(), json!(component.container_name));
    options.insert("Image".into(), json!(component.image.name));
    options.insert("Dns".into(), json!(app.config.dns));
    if app.has_data_component() && !component.is_data() {
        options.insert(
            "HostConfig".into(),
            json!({ "VolumesFrom": [component.data_container_name] }),
        );
    }
    merge_options(&mut options, &component.spec.install);
    merge_options(&mut options, overrides);
    options
}

/// Start options for `component`, layered the same way as [`install_options`].
pub fn start_options(app: &App, component: &Component, overrides: &OptionMap) -> OptionMap {
    let mut options = OptionMap::new();
    options.insert("PublishAllPorts".into(), Value::Bool(true));
    options.insert(
        "Binds".into(),
        json!([format!("{}:{CODE_MOUNT}:rw", app.root_bind)]),
    );
    merge_options(&mut options, &component.spec.start);
    merge_options(&mut options, overrides);
    options
}

fn merge_options(target: &mut OptionMap, layer: &OptionMap) {
    for (key, value) in layer {
        target.insert(key.clone(), value.clone());
    }
}

/// Components named by `selection` (every component when empty), data component first.
pub fn select_components<'a>(app: &'a App, selection: &[String]) -> Result<Vec<&'a AppComponent>> {
    if let Some(unknown) = selection
        .iter()
        .find(|name| !app.components.contains_key(name.as_str()))
    {
        return Err(Error::UnknownComponent {
            app: app.name.clone(),
            component: unknown.clone(),
        });
    }

    Ok(app
        .components_ordered()
        .into_iter()
        .filter(|component| {
            selection.is_empty() || selection.iter().any(|name| name == component.name())
        })
        .collect())
}

fn run_phase<B, F>(
    ctx: &LifecycleContext<'_>,
    app: &App,
    phase: Phase,
    selection: &[String],
    reporter: Option<&mut dyn Reporter>,
    before_batch: B,
    op: F,
) -> OperationResult<PhaseOutcome>
where
    B: FnOnce(&mut ReporterProxy<'_, '_>) -> Result<()>,
    F: Fn(&Component, &EventSink<ComponentOutcome>) -> Result<ComponentOutcome> + Sync,
{
    let mut events = Vec::new();
    let mut reporter = ReporterProxy::new(reporter, &mut events);

    ctx.services.verify()?;
    let targets = select_components(app, selection)?;

    info!("{phase} `{}`: {} component(s)", app.name, targets.len());
    reporter.emit(Event::PhaseStarted {
        app: app.name.clone(),
        phase,
    });

    dispatch_app_hook(ctx.hooks, &phase.pre(), app, &mut reporter)?;
    before_batch(&mut reporter)?;

    let unit = |entry: &&AppComponent, sink: &EventSink<ComponentOutcome>| {
        let component = entry.descriptor(app);
        op(&*component, sink).map_err(|source| Error::ComponentFailed {
            phase,
            component: component.name.clone(),
            source: Box::new(source),
        })
    };

    // Dependents attach the data container's volumes at create time, so it goes alone first.
    let report = match targets.split_first() {
        Some((first, rest)) if phase == Phase::Install && first.name() == DATA_COMPONENT => {
            let mut report = batch::for_each_component(&[*first], &mut reporter, unit);
            if report.is_success() {
                let others = batch::for_each_component(rest, &mut reporter, unit);
                report.completed.extend(others.completed);
                report.failures.extend(others.failures);
                report.diagnostics.extend(others.diagnostics);
            }
            report
        }
        _ => batch::for_each_component(&targets, &mut reporter, unit),
    };

    let BatchReport {
        completed,
        mut failures,
        diagnostics,
    } = report;

    if !failures.is_empty() {
        reporter.emit(Event::PhaseCompleted {
            app: app.name.clone(),
            phase,
            failures: failures.len(),
        });
        warn!(
            "{phase} `{}`: {} component(s) failed",
            app.name,
            failures.len()
        );
        return Err(if phase.aggregates_failures() {
            Error::ComponentFailures { phase, failures }
        } else {
            failures.remove(0)
        });
    }

    dispatch_app_hook(ctx.hooks, &phase.post(), app, &mut reporter)?;

    reporter.emit(Event::PhaseCompleted {
        app: app.name.clone(),
        phase,
        failures: 0,
    });

    Ok(OperationOutput::new(PhaseOutcome {
        app: app.name.clone(),
        phase,
        components: completed,
    })
    .with_diagnostics(diagnostics)
    .with_events(events))
}

fn install_component(
    ctx: &LifecycleContext<'_>,
    app: &App,
    component: &Component,
    overrides: &OptionMap,
    sink: &EventSink<ComponentOutcome>,
) -> Result<ComponentOutcome> {
    let mut options = install_options(app, component, overrides);
    dispatch_component_hook(
        ctx.hooks,
        &Phase::Install.pre_component(),
        app,
        component,
        &mut options,
        None,
        sink,
    )?;

    if let (true, Some(context)) = (component.image.build, &component.image.context) {
        ctx.engine.build(&BuildRequest {
            tag: component.image.name.clone(),
            context: context.clone(),
        })?;
        sink.emit(Event::ImageBuilt {
            component: component.name.clone(),
            image: component.image.name.clone(),
        });
    }

    let host = start_options(app, component, &OptionMap::new());
    let container = ctx.engine.create(&options, &host)?;
    sink.emit(Event::ContainerCreated {
        component: component.name.clone(),
        container_id: container.id.clone(),
    });

    identity::write(&component.identity_path, &container.id)?;
    sink.emit(Event::IdentityRecorded {
        component: component.name.clone(),
        path: component.identity_path.clone(),
    });

    dispatch_component_hook(
        ctx.hooks,
        &Phase::Install.post_component(),
        app,
        component,
        &mut options,
        Some(&container.id),
        sink,
    )?;

    Ok(ComponentOutcome {
        name: component.name.clone(),
        container_id: Some(container.id),
        changed: true,
    })
}

fn start_component(
    ctx: &LifecycleContext<'_>,
    app: &App,
    component: &Component,
    overrides: &OptionMap,
    sink: &EventSink<ComponentOutcome>,
) -> Result<ComponentOutcome> {
    let container_id = recorded_container(component)?.ok_or_else(|| {
        Error::ComponentNotInstalled {
            component: component.name.clone(),
        }
    })?;

    let mut options = start_options(app, component, overrides);
    dispatch_component_hook(
        ctx.hooks,
        &Phase::Start.pre_component(),
        app,
        component,
        &mut options,
        Some(&container_id),
        sink,
    )?;

    ctx.engine.start(&container_id, &options)?;
    sink.emit(Event::ContainerStarted {
        component: component.name.clone(),
        container_id: container_id.clone(),
    });

    dispatch_component_hook(
        ctx.hooks,
        &Phase::Start.post_component(),
        app,
        component,
        &mut options,
        Some(&container_id),
        sink,
    )?;

    Ok(ComponentOutcome {
        name: component.name.clone(),
        container_id: Some(container_id),
        changed: true,
    })
}

fn stop_component(
    ctx: &LifecycleContext<'_>,
    app: &App,
    component: &Component,
    sink: &EventSink<ComponentOutcome>,
) -> Result<ComponentOutcome> {
    let container_id = recorded_container(component)?;
    let mut options = OptionMap::new();
    dispatch_component_hook(
        ctx.hooks,
        &Phase::Stop.pre_component(),
        app,
        component,
        &mut options,
        container_id.as_deref(),
        sink,
    )?;

    let changed = match &container_id {
        Some(id) => match ctx.engine.stop(id) {
            Ok(()) => {
                sink.emit(Event::ContainerStopped {
                    component: component.name.clone(),
                    container_id: id.clone(),
                });
                true
            }
            Err(Error::ContainerNotFound { .. }) => {
                sink.diagnostic(stale_identity(component, id));
                false
            }
            Err(err) => return Err(err),
        },
        None => {
            sink.emit(Event::ComponentSkipped {
                component: component.name.clone(),
                phase: Phase::Stop,
            });
            false
        }
    };

    dispatch_component_hook(
        ctx.hooks,
        &Phase::Stop.post_component(),
        app,
        component,
        &mut options,
        container_id.as_deref(),
        sink,
    )?;

    Ok(ComponentOutcome {
        name: component.name.clone(),
        container_id,
        changed,
    })
}

fn uninstall_component(
    ctx: &LifecycleContext<'_>,
    app: &App,
    component: &Component,
    sink: &EventSink<ComponentOutcome>,
) -> Result<ComponentOutcome> {
    let container_id = recorded_container(component)?;
    let mut options = OptionMap::new();
    dispatch_component_hook(
        ctx.hooks,
        &Phase::Uninstall.pre_component(),
        app,
        component,
        &mut options,
        container_id.as_deref(),
        sink,
    )?;

    let mut changed = false;
    match &container_id {
        Some(id) => match ctx.engine.remove(id) {
            Ok(()) => {
                sink.emit(Event::ContainerRemoved {
                    component: component.name.clone(),
                    container_id: id.clone(),
                });
                changed = true;
            }
            Err(Error::ContainerNotFound { .. }) => sink.diagnostic(stale_identity(component, id)),
            Err(err) => return Err(err),
        },
        None => sink.emit(Event::ComponentSkipped {
            component: component.name.clone(),
            phase: Phase::Uninstall,
        }),
    }

    // Best effort: a record that cannot be deleted is surfaced, never fatal.
    match identity::clear(&component.identity_path) {
        Ok(existed) => sink.emit(Event::IdentityCleared {
            component: component.name.clone(),
            path: component.identity_path.clone(),
            existed,
        }),
        Err(err) => sink.diagnostic(
            Diagnostic::warning(format!(
                "Could not delete the identity record for `{}`: {err}",
                component.name
            ))
            .with_path(component.identity_path.clone())
            .with_help("Delete the file by hand before reinstalling this component."),
        ),
    }

    dispatch_component_hook(
        ctx.hooks,
        &Phase::Uninstall.post_component(),
        app,
        component,
        &mut options,
        container_id.as_deref(),
        sink,
    )?;

    Ok(ComponentOutcome {
        name: component.name.clone(),
        container_id,
        changed,
    })
}

/// Container recorded on disk right now, which may be newer than the assembled view.
fn recorded_container(component: &Component) -> Result<Option<String>> {
    identity::read(&component.identity_path)
}

fn stale_identity(component: &Component, container_id: &str) -> Diagnostic {
    Diagnostic::new(
        Severity::Warning,
        format!(
            "Container {container_id} recorded for `{}` no longer exists.",
            component.name
        ),
    )
    .with_path(component.identity_path.clone())
}

fn dispatch_app_hook(
    hooks: &HookBus,
    event: &str,
    app: &App,
    reporter: &mut ReporterProxy<'_, '_>,
) -> Result<()> {
    reporter.emit(Event::HookDispatched {
        event: event.to_string(),
        component: None,
        subscribers: hooks.subscriber_count(event),
    });
    hooks.emit(event, &mut HookPayload::App(app))
}

fn dispatch_component_hook(
    hooks: &HookBus,
    event: &str,
    app: &App,
    component: &Component,
    options: &mut OptionMap,
    container_id: Option<&str>,
    sink: &EventSink<ComponentOutcome>,
) -> Result<()> {
    sink.emit(Event::HookDispatched {
        event: event.to_string(),
        component: Some(component.name.clone()),
        subscribers: hooks.subscriber_count(event),
    });
    hooks.emit(
        event,
        &mut HookPayload::Component {
            app,
            component,
            options,
            container_id,
        },
    )
}

/// Reduce an aggregated failure to its first member.
fn first_failure(err: Error) -> Error {
    match err {
        Error::ComponentFailures { mut failures, .. } if !failures.is_empty() => {
            failures.remove(0)
        }
        other => other,
    }
}

pub(crate) struct ReporterProxy<'a, 'b> {
    delegate: Option<&'a mut dyn Reporter>,
    events: &'b mut Vec<Event>,
}

impl<'a, 'b> ReporterProxy<'a, 'b> {
    fn new(delegate: Option<&'a mut dyn Reporter>, events: &'b mut Vec<Event>) -> Self {
        Self { delegate, events }
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event.clone());
        if let Some(reporter) = &mut self.delegate {
            reporter.report(event);
        }
    }
}

impl Reporter for ReporterProxy<'_, '_> {
    fn report(&mut self, event: Event) {
        self.emit(event);
    }
}
