use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

use kbox::core::discovery::Discovery;
use kbox::core::identity;
use kbox::core::plugins::{APP_LABEL, COMPONENT_LABEL, LABELS_PLUGIN};
use kbox::core::{
    AlwaysReady, App, AppRegistry, BuildRequest, ContainerHandle, Engine, FileDiscovery, HookBus,
    HookPayload, HookResult, InstallOptions, LifecycleContext, Phase, PluginRegistry,
    ServiceReadiness, StartOptions, StopOptions, TomlConfigLoader, UninstallOptions, assemble,
    install, load_plugins, rebuild, restart, start, stop, uninstall,
};
use kbox::{Error, GlobalConfig, OptionMap, Result};

#[derive(Debug, Clone, PartialEq)]
struct Call {
    op: &'static str,
    target: String,
    options: OptionMap,
    /// Start options handed over at creation; empty for every other call.
    host: OptionMap,
}

/// In-memory engine recording every call; failures are injected per operation and
/// container-name prefix.
#[derive(Default)]
struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<Vec<(&'static str, String)>>,
    missing: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeEngine {
    fn fail_on(&self, op: &'static str, prefix: &str) {
        self.failing.lock().unwrap().push((op, prefix.to_string()));
    }

    fn forget(&self, prefix: &str) {
        self.missing.lock().unwrap().push(prefix.to_string());
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|call| call.op == op).collect()
    }

    fn record(&self, op: &'static str, target: &str, options: &OptionMap) -> Result<()> {
        self.record_with_host(op, target, options, &OptionMap::new())
    }

    fn record_with_host(
        &self,
        op: &'static str,
        target: &str,
        options: &OptionMap,
        host: &OptionMap,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call {
            op,
            target: target.to_string(),
            options: options.clone(),
            host: host.clone(),
        });
        let failing = self.failing.lock().unwrap();
        if failing
            .iter()
            .any(|(failing_op, prefix)| *failing_op == op && target.starts_with(prefix.as_str()))
        {
            return Err(Error::Engine {
                action: op,
                target: target.to_string(),
                message: "injected failure".into(),
            });
        }
        let missing = self.missing.lock().unwrap();
        if op != "create" && missing.iter().any(|prefix| target.starts_with(prefix.as_str())) {
            return Err(Error::ContainerNotFound {
                container_id: target.to_string(),
            });
        }
        Ok(())
    }
}

impl Engine for FakeEngine {
    fn build(&self, request: &BuildRequest) -> Result<()> {
        self.record("build", &request.tag, &OptionMap::new())
    }

    fn create(&self, options: &OptionMap, host: &OptionMap) -> Result<ContainerHandle> {
        let name = options
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("anonymous")
            .to_string();
        self.record_with_host("create", &name, options, host)?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(ContainerHandle {
            id: format!("{name}-{n}"),
        })
    }

    fn start(&self, container_id: &str, options: &OptionMap) -> Result<()> {
        self.record("start", container_id, options)
    }

    fn stop(&self, container_id: &str) -> Result<()> {
        self.record("stop", container_id, &OptionMap::new())
    }

    fn remove(&self, container_id: &str) -> Result<()> {
        self.record("remove", container_id, &OptionMap::new())
    }
}

struct EngineDown;

impl ServiceReadiness for EngineDown {
    fn verify(&self) -> Result<()> {
        Err(Error::ServicesUnavailable {
            message: "engine is not running".into(),
        })
    }
}

const DRUPAL: &str = r#"
[app]
name = "drupal"

[components.data]
image = { name = "busybox" }

[components.web]
image = { name = "kbox/web", build = true }
install = { Env = ["DRUPAL=1"] }

[components.db]
image = { name = "mariadb:10" }
"#;

const BLOG: &str = r#"
[app]
name = "blog"

[components.web]
image = { name = "nginx" }
"#;

struct Fixture {
    home: TempDir,
    root: TempDir,
    engine: FakeEngine,
    discovery: FileDiscovery,
    hooks: HookBus,
}

impl Fixture {
    fn new() -> Self {
        let home = tempdir().unwrap();
        let discovery = FileDiscovery::in_home(home.path());
        Self {
            home,
            root: tempdir().unwrap(),
            engine: FakeEngine::default(),
            discovery,
            hooks: HookBus::new(),
        }
    }

    fn loader(&self) -> TomlConfigLoader {
        TomlConfigLoader::new(GlobalConfig::defaults(self.home.path()))
    }

    fn app(&self, config: &str) -> App {
        write_config(self.root.path(), config);
        let config = self
            .loader()
            .load_file(&self.root.path().join("kbox.toml"))
            .unwrap();
        assemble(config).unwrap()
    }

    fn ctx(&self) -> LifecycleContext<'_> {
        LifecycleContext::new(&self.engine, &AlwaysReady, &self.discovery, &self.hooks)
    }
}

fn write_config(dir: &Path, contents: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("kbox.toml"), contents).unwrap();
}

fn recorded(app: &App, component: &str) -> Option<String> {
    let path = identity::identity_path(&app.cids_root, component);
    identity::read(&path).unwrap()
}

fn record_hooks(bus: &mut HookBus) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for phase in [Phase::Install, Phase::Start, Phase::Stop, Phase::Uninstall] {
        for event in [
            phase.pre(),
            phase.pre_component(),
            phase.post_component(),
            phase.post(),
        ] {
            let log = Arc::clone(&log);
            let name = event.clone();
            bus.subscribe(event, move |payload: &mut HookPayload<'_>| -> HookResult {
                let entry = match payload.component() {
                    Some(component) => format!("{name}:{}", component.name),
                    None => name.clone(),
                };
                log.lock().unwrap().push(entry);
                Ok(())
            });
        }
    }
    log
}

#[test]
fn drupal_install_demotes_missing_builds_and_records_every_identity() {
    let fx = Fixture::new();
    let app = fx.app(DRUPAL);

    let web = app.components["web"].resolved().unwrap();
    assert!(!web.image.build);
    assert!(app.components["data"].is_placeholder());

    let output = install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    assert_eq!(output.value.components.len(), 3);
    assert_eq!(output.value.changed(), 3);

    for name in ["data", "web", "db"] {
        let id = recorded(&app, name).expect("identity recorded");
        assert_eq!(output.value.component(name).unwrap().container_id, Some(id));
    }

    let creates = fx.engine.calls_for("create");
    assert_eq!(creates[0].target, "kb_drupal_data");
    assert!(fx.engine.calls_for("build").is_empty());

    let web_create = creates
        .iter()
        .find(|call| call.target == "kb_drupal_web")
        .unwrap();
    assert_eq!(web_create.options["Env"], json!(["DRUPAL=1"]));
    assert_eq!(
        web_create.options["HostConfig"],
        json!({ "VolumesFrom": ["kb_drupal_data"] })
    );
    assert_eq!(web_create.options["Hostname"], json!("web.drupal.kbox"));
}

#[test]
fn install_builds_images_when_a_dockerfile_exists() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.root.path().join("web")).unwrap();
    fs::write(fx.root.path().join("web").join("Dockerfile"), "FROM nginx").unwrap();
    let app = fx.app(DRUPAL);

    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();

    let builds = fx.engine.calls_for("build");
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].target, "kbox/web");
}

#[test]
fn install_registers_the_app_directory() {
    let fx = Fixture::new();
    let app = fx.app(BLOG);

    let output = install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();

    assert_eq!(fx.discovery.list().unwrap().len(), 1);
    assert!(
        output
            .events
            .iter()
            .any(|event| matches!(event, kbox::core::Event::AppRegistered { app, .. } if app == "blog"))
    );
}

#[test]
fn reinstalling_overwrites_the_identity_record() {
    let fx = Fixture::new();
    let app = fx.app(BLOG);

    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    let first = recorded(&app, "web").unwrap();
    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    let second = recorded(&app, "web").unwrap();

    assert_ne!(first, second);
    assert_eq!(second, "kb_blog_web-1");
}

#[test]
fn uninstall_clears_identities_even_when_containers_are_gone() {
    let fx = Fixture::new();
    let app = fx.app(DRUPAL);
    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    fx.engine.forget("kb_drupal_web");

    let output = uninstall(&fx.ctx(), &app, &UninstallOptions::default(), None).unwrap();

    for name in ["data", "web", "db"] {
        assert_eq!(recorded(&app, name), None);
    }
    assert!(!output.value.component("web").unwrap().changed);
    assert!(output.value.component("db").unwrap().changed);
    assert_eq!(output.diagnostics.len(), 1);
}

#[test]
fn stop_without_containers_is_a_no_op() {
    let fx = Fixture::new();
    let app = fx.app(BLOG);

    let output = stop(&fx.ctx(), &app, &StopOptions::default(), None).unwrap();

    assert_eq!(output.value.changed(), 0);
    assert!(fx.engine.calls().is_empty());
}

#[test]
fn start_requires_an_installed_container() {
    let fx = Fixture::new();
    let app = fx.app(BLOG);

    match start(&fx.ctx(), &app, &StartOptions::default(), None).unwrap_err() {
        Error::ComponentFailures { phase, failures } => {
            assert_eq!(phase, Phase::Start);
            assert_eq!(failures.len(), 1);
            match &failures[0] {
                Error::ComponentFailed { source, .. } => {
                    assert!(matches!(**source, Error::ComponentNotInstalled { .. }));
                }
                other => panic!("unexpected failure: {other:?}"),
            }
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn start_uses_the_recorded_container_and_merges_overrides_last() {
    let fx = Fixture::new();
    let app = fx.app(BLOG);
    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    let id = recorded(&app, "web").unwrap();

    let mut overrides = OptionMap::new();
    overrides.insert("PublishAllPorts".into(), json!(false));
    let options = StartOptions {
        components: Vec::new(),
        overrides,
    };
    start(&fx.ctx(), &app, &options, None).unwrap();

    let starts = fx.engine.calls_for("start");
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].target, id);
    assert_eq!(starts[0].options["PublishAllPorts"], json!(false));
    assert_eq!(
        starts[0].options["Binds"],
        json!([format!("{}:/src:rw", app.root_bind)])
    );
}

#[test]
fn start_and_stop_report_every_failure() {
    let fx = Fixture::new();
    let app = fx.app(DRUPAL);
    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    fx.engine.fail_on("start", "kb_drupal_web");
    fx.engine.fail_on("start", "kb_drupal_db");
    fx.engine.fail_on("stop", "kb_drupal_web");
    fx.engine.fail_on("stop", "kb_drupal_db");

    for err in [
        start(&fx.ctx(), &app, &StartOptions::default(), None).unwrap_err(),
        stop(&fx.ctx(), &app, &StopOptions::default(), None).unwrap_err(),
    ] {
        let Error::ComponentFailures { failures, .. } = err else {
            panic!("expected an aggregate failure, got {err:?}");
        };
        let mut components: Vec<&str> = failures.iter().filter_map(Error::component).collect();
        components.sort();
        assert_eq!(components, vec!["db", "web"]);
    }

    // The data component was still attempted.
    assert_eq!(
        fx.engine
            .calls_for("start")
            .iter()
            .filter(|call| call.target.starts_with("kb_drupal_data"))
            .count(),
        1
    );
}

#[test]
fn install_reports_a_single_failure() {
    let fx = Fixture::new();
    let app = fx.app(DRUPAL);
    fx.engine.fail_on("create", "kb_drupal_web");
    fx.engine.fail_on("create", "kb_drupal_db");

    let err = install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap_err();

    assert!(matches!(err, Error::ComponentFailed { phase: Phase::Install, .. }));
    assert!(recorded(&app, "data").is_some());
}

#[test]
fn failed_install_skips_the_post_install_hook() {
    let mut fx = Fixture::new();
    let log = record_hooks(&mut fx.hooks);
    let app = fx.app(BLOG);
    fx.engine.fail_on("create", "kb_blog_web");

    let err = install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap_err();

    assert_eq!(err.component(), Some("web"));
    let log = log.lock().unwrap().clone();
    assert!(log.contains(&"pre-install".to_string()));
    assert!(log.contains(&"pre-install-component:web".to_string()));
    assert!(!log.contains(&"post-install-component:web".to_string()));
    assert!(!log.contains(&"post-install".to_string()));
}

#[test]
fn uninstall_reports_a_single_failure() {
    let fx = Fixture::new();
    let app = fx.app(DRUPAL);
    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    fx.engine.fail_on("remove", "kb_drupal_web");
    fx.engine.fail_on("remove", "kb_drupal_db");

    let err = uninstall(&fx.ctx(), &app, &UninstallOptions::default(), None).unwrap_err();

    assert!(matches!(
        err,
        Error::ComponentFailed {
            phase: Phase::Uninstall,
            ..
        }
    ));
    assert_eq!(recorded(&app, "data"), None);
    assert!(recorded(&app, "web").is_some());
    assert!(recorded(&app, "db").is_some());
}

#[test]
fn install_hands_start_options_to_create() {
    let fx = Fixture::new();
    let app = fx.app(
        r#"
[app]
name = "blog"

[components.web]
image = { name = "nginx" }
start = { Privileged = true }
"#,
    );

    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();

    let creates = fx.engine.calls_for("create");
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].host["PublishAllPorts"], json!(true));
    assert_eq!(creates[0].host["Privileged"], json!(true));
    assert_eq!(
        creates[0].host["Binds"],
        json!([format!("{}:/src:rw", app.root_bind)])
    );
    assert!(creates[0].options.get("PublishAllPorts").is_none());
}

#[test]
fn failed_data_install_leaves_dependents_untouched() {
    let fx = Fixture::new();
    let app = fx.app(DRUPAL);
    fx.engine.fail_on("create", "kb_drupal_data");

    let err = install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap_err();

    assert_eq!(err.component(), Some("data"));
    assert_eq!(fx.engine.calls_for("create").len(), 1);
}

#[test]
fn restart_fires_the_same_hooks_as_stop_then_start() {
    let mut fx = Fixture::new();
    let log = record_hooks(&mut fx.hooks);
    let app = fx.app(BLOG);
    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();

    log.lock().unwrap().clear();
    restart(&fx.ctx(), &app, &StartOptions::default(), None).unwrap();
    let restarted = std::mem::take(&mut *log.lock().unwrap());

    stop(&fx.ctx(), &app, &StopOptions::default(), None).unwrap();
    start(&fx.ctx(), &app, &StartOptions::default(), None).unwrap();
    let sequential = log.lock().unwrap().clone();

    assert_eq!(restarted, sequential);
    assert_eq!(
        restarted,
        vec![
            "pre-stop",
            "pre-stop-component:web",
            "post-stop-component:web",
            "post-stop",
            "pre-start",
            "pre-start-component:web",
            "post-start-component:web",
            "post-start",
        ]
    );
}

#[test]
fn hook_veto_stops_the_phase_before_the_engine() {
    let mut fx = Fixture::new();
    fx.hooks.subscribe(
        Phase::Install.pre(),
        |_: &mut HookPayload<'_>| -> HookResult { Err("maintenance window".into()) },
    );
    let app = fx.app(BLOG);

    let err = install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap_err();

    assert!(matches!(err, Error::HookVeto { ref event, .. } if event == "pre-install"));
    assert!(fx.engine.calls().is_empty());
    assert_eq!(recorded(&app, "web"), None);
}

#[test]
fn component_hooks_can_rewrite_engine_options() {
    let mut fx = Fixture::new();
    fx.hooks.subscribe(
        Phase::Install.pre_component(),
        |payload: &mut HookPayload<'_>| -> HookResult {
            if let Some(options) = payload.options_mut() {
                options.insert("Tty".into(), json!(true));
            }
            Ok(())
        },
    );
    let app = fx.app(BLOG);

    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();

    assert_eq!(fx.engine.calls_for("create")[0].options["Tty"], json!(true));
}

#[test]
fn labels_plugin_tags_created_containers() {
    let mut fx = Fixture::new();
    load_plugins(
        &PluginRegistry::with_builtins(),
        &[LABELS_PLUGIN.to_string()],
        &mut fx.hooks,
    )
    .unwrap();
    let app = fx.app(BLOG);

    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();

    let labels = &fx.engine.calls_for("create")[0].options["Labels"];
    assert_eq!(labels[APP_LABEL], json!("blog"));
    assert_eq!(labels[COMPONENT_LABEL], json!("web"));
}

#[test]
fn unavailable_services_touch_nothing() {
    let fx = Fixture::new();
    let app = fx.app(BLOG);
    let ctx = LifecycleContext::new(&fx.engine, &EngineDown, &fx.discovery, &fx.hooks);

    let err = install(&ctx, &app, &InstallOptions::default(), None).unwrap_err();

    assert!(matches!(err, Error::ServicesUnavailable { .. }));
    assert!(fx.engine.calls().is_empty());
    assert!(fx.discovery.list().unwrap().is_empty());
}

#[test]
fn unknown_component_selection_is_rejected() {
    let fx = Fixture::new();
    let app = fx.app(BLOG);
    let options = StopOptions {
        components: vec!["cache".into()],
    };

    let err = stop(&fx.ctx(), &app, &options, None).unwrap_err();
    assert!(matches!(err, Error::UnknownComponent { .. }));
}

// Rebuild treats the data component like any other: its container and record are replaced.
#[test]
fn rebuild_recreates_the_data_component_too() {
    let fx = Fixture::new();
    let app = fx.app(DRUPAL);
    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    let data_before = recorded(&app, "data").unwrap();

    let output = rebuild(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();

    let data_after = recorded(&app, "data").unwrap();
    assert_ne!(data_before, data_after);
    assert!(
        fx.engine
            .calls_for("remove")
            .iter()
            .any(|call| call.target == data_before)
    );
    assert_eq!(output.value.install.changed(), 3);
}

#[test]
fn rebuild_forwards_only_the_first_stop_failure() {
    let fx = Fixture::new();
    let app = fx.app(DRUPAL);
    install(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap();
    fx.engine.fail_on("stop", "kb_drupal_web");
    fx.engine.fail_on("stop", "kb_drupal_db");

    let err = rebuild(&fx.ctx(), &app, &InstallOptions::default(), None).unwrap_err();

    assert!(matches!(err, Error::ComponentFailed { phase: Phase::Stop, .. }));
    assert!(fx.engine.calls_for("remove").is_empty());
}

#[test]
fn registry_lists_apps_and_rejects_duplicate_names() {
    let home = tempdir().unwrap();
    let sites = tempdir().unwrap();
    let discovery = FileDiscovery::in_home(home.path());
    let loader = TomlConfigLoader::new(GlobalConfig::defaults(home.path()));

    let blog = sites.path().join("blog");
    write_config(&blog, BLOG);
    discovery.register_app_dir(&blog).unwrap();

    let registry = AppRegistry::new(&discovery, &loader);
    let apps = registry.list().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(registry.get("blog").unwrap().name, "blog");
    assert!(matches!(
        registry.get("ghost").unwrap_err(),
        Error::AppNotFound { .. }
    ));

    let copy = sites.path().join("blog-copy");
    write_config(&copy, BLOG);
    discovery.register_app_dir(&copy).unwrap();

    match registry.list().unwrap_err() {
        Error::DuplicateApp { name, dirs } => {
            assert_eq!(name, "blog");
            assert_eq!(dirs.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
