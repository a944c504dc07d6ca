use std::collections::{BTreeMap, BTreeSet};

use porter_domain::{
    ApplyReport, DEFAULT_DRIVER, OutputMap, Resource, ResourceGroup, ResourceResult,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ApplyError, DriverError, HookError};
use crate::graph::build_execution_order;
use crate::resolve::{OutputTable, Resolver};

/// What a driver did with its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Unchanged,
}

/// Applies a single resource.
pub trait Driver {
    fn should_apply(&self, _resource: &Resource) -> bool {
        true
    }

    /// Apply `resource`, reading earlier results from `outputs`.
    ///
    /// # Errors
    ///
    /// Returns an error describing the failed step.
    fn apply(&mut self, resource: &Resource, outputs: &OutputTable) -> Result<ApplyOutcome, DriverError>;

    /// Values later resources may reference.
    fn output(&self) -> OutputMap;
}

/// Constructs the driver for a resource.
pub trait DriverFactory {
    /// # Errors
    ///
    /// Returns an error when the resource's target or source is malformed.
    fn create(&self, resource: &Resource) -> Result<Box<dyn Driver>, DriverError>;
}

impl<F> DriverFactory for F
where
    F: Fn(&Resource) -> Result<Box<dyn Driver>, DriverError>,
{
    fn create(&self, resource: &Resource) -> Result<Box<dyn Driver>, DriverError> {
        self(resource)
    }
}

/// Callbacks around a run.
pub trait Hook {
    /// # Errors
    ///
    /// A failure aborts the run before any resource is applied.
    fn pre_apply(&mut self, _group: &ResourceGroup) -> Result<(), HookError> {
        Ok(())
    }

    /// Query expressions to evaluate against the outputs once every resource
    /// has been applied.
    fn data_queries(&self, _group: &ResourceGroup) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    /// # Errors
    ///
    /// A failure is reported through [`Hook::on_error`].
    fn post_apply(
        &mut self,
        _group: &ResourceGroup,
        _populated: &BTreeMap<String, Value>,
    ) -> Result<(), HookError> {
        Ok(())
    }

    fn on_error(&mut self, _error: &ApplyError) {}

    /// Called once after the per-resource phase when any driver failed.
    /// `applied` holds the resources that were applied or left unchanged;
    /// resources skipped behind a failure appear in neither map.
    fn on_consolidated_errors(
        &mut self,
        _group: &ResourceGroup,
        _errors: &BTreeMap<String, DriverError>,
        _applied: &BTreeSet<String>,
    ) {
    }
}

/// Dependency-aware executor for resource groups.
pub trait Executor {
    fn register_driver(&mut self, kind: &str, factory: Box<dyn DriverFactory>);
    fn set_default_driver(&mut self, kind: &str);
    fn register_hook(&mut self, name: &str, hook: Box<dyn Hook>);
    fn apply(&mut self, group: &ResourceGroup) -> ApplyReport;
}

/// Sequential [`Executor`]: one resource at a time in topological order.
pub struct Worker {
    factories: BTreeMap<String, Box<dyn DriverFactory>>,
    default_driver: String,
    hooks: Vec<(String, Box<dyn Hook>)>,
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            default_driver: DEFAULT_DRIVER.to_string(),
            hooks: Vec::new(),
        }
    }

    fn driver_kind<'a>(&'a self, resource: &'a Resource) -> &'a str {
        resource.driver().unwrap_or(&self.default_driver)
    }

    fn fail_run(&mut self, report: &mut ApplyReport, error: &ApplyError) {
        warn!(%error, "apply aborted");
        for (name, hook) in &mut self.hooks {
            debug!(hook = name.as_str(), "running on_error");
            hook.on_error(error);
        }
        report.errors.push(error.to_string());
        report.forbidden |= error.is_forbidden();
    }

    fn construct_drivers<'g>(
        &self,
        resources: &[&'g Resource],
    ) -> Result<Vec<(&'g Resource, Box<dyn Driver>)>, DriverError> {
        resources
            .iter()
            .map(|resource| -> Result<_, DriverError> {
                let kind = self.driver_kind(resource);
                let factory =
                    self.factories
                        .get(kind)
                        .ok_or_else(|| DriverError::UnknownDriver {
                            resource: resource.name.to_string(),
                            kind: kind.to_string(),
                        })?;
                Ok((*resource, factory.create(resource)?))
            })
            .collect()
    }

    fn run_pre_apply(&mut self, group: &ResourceGroup) -> Result<(), ApplyError> {
        for (name, hook) in &mut self.hooks {
            debug!(hook = name.as_str(), "running pre_apply");
            hook.pre_apply(group).map_err(|source| ApplyError::Hook {
                hook: name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn run_post_apply(&mut self, group: &ResourceGroup, outputs: &OutputTable) -> Result<(), ApplyError> {
        let resolver = Resolver::unrestricted(outputs);
        for (name, hook) in &mut self.hooks {
            let mut populated = BTreeMap::new();
            for (key, query) in hook.data_queries(group) {
                match resolver.resolve_value(&query) {
                    Ok(value) => {
                        populated.insert(key, value);
                    }
                    Err(error) => {
                        debug!(hook = name.as_str(), key = key.as_str(), %error, "data query unresolved");
                    }
                }
            }

            debug!(hook = name.as_str(), "running post_apply");
            hook.post_apply(group, &populated)
                .map_err(|source| ApplyError::Hook {
                    hook: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl Executor for Worker {
    fn register_driver(&mut self, kind: &str, factory: Box<dyn DriverFactory>) {
        self.factories.insert(kind.to_string(), factory);
    }

    fn set_default_driver(&mut self, kind: &str) {
        kind.clone_into(&mut self.default_driver);
    }

    fn register_hook(&mut self, name: &str, hook: Box<dyn Hook>) {
        self.hooks.push((name.to_string(), hook));
    }

    fn apply(&mut self, group: &ResourceGroup) -> ApplyReport {
        let mut report = ApplyReport::default();

        let order = match build_execution_order(&group.resources) {
            Ok(order) => order,
            Err(error) => {
                self.fail_run(&mut report, &error.into());
                return report;
            }
        };
        report.execution_order.clone_from(&order);

        let ordered: Vec<&Resource> = order
            .iter()
            .filter_map(|name| group.get(name))
            .collect();

        let drivers = match self.construct_drivers(&ordered) {
            Ok(drivers) => drivers,
            Err(error) => {
                self.fail_run(&mut report, &error.into());
                return report;
            }
        };

        if let Err(error) = self.run_pre_apply(group) {
            self.fail_run(&mut report, &error);
            return report;
        }

        let mut outputs = OutputTable::new();
        let mut failures: BTreeMap<String, DriverError> = BTreeMap::new();
        let mut blocked: BTreeSet<String> = BTreeSet::new();
        let mut applied: BTreeSet<String> = BTreeSet::new();

        for (resource, mut driver) in drivers {
            let name = resource.name.as_str();
            let kind = self.driver_kind(resource).to_string();

            if let Some(dependency) = resource
                .depends_on
                .iter()
                .find(|dependency| blocked.contains(dependency.as_str()))
            {
                info!(resource = name, dependency = dependency.as_str(), "skipping resource");
                report.results.push(ResourceResult::skipped(
                    name,
                    &kind,
                    format!("dependency {dependency} did not apply"),
                ));
                blocked.insert(name.to_string());
                continue;
            }

            if !driver.should_apply(resource) {
                info!(resource = name, "driver declined resource");
                report.results.push(ResourceResult::skipped(
                    name,
                    &kind,
                    "driver declined to apply".to_string(),
                ));
                blocked.insert(name.to_string());
                continue;
            }

            info!(resource = name, driver = kind.as_str(), "applying resource");
            match driver.apply(resource, &outputs) {
                Ok(outcome) => {
                    outputs.insert(name.to_string(), driver.output());
                    applied.insert(name.to_string());
                    report.results.push(match outcome {
                        ApplyOutcome::Applied => ResourceResult::applied(name, &kind),
                        ApplyOutcome::Unchanged => ResourceResult::unchanged(name, &kind),
                    });
                }
                Err(error) => {
                    warn!(resource = name, %error, "resource failed");
                    report
                        .results
                        .push(ResourceResult::failed(name, &kind, error.to_string()));
                    blocked.insert(name.to_string());
                    report.forbidden |= error.is_forbidden();
                    failures.insert(name.to_string(), error);
                }
            }
        }

        if !failures.is_empty() {
            for (name, hook) in &mut self.hooks {
                debug!(hook = name.as_str(), "running on_consolidated_errors");
                hook.on_consolidated_errors(group, &failures, &applied);
            }
            return report;
        }

        if let Err(error) = self.run_post_apply(group, &outputs) {
            self.fail_run(&mut report, &error);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::cell::RefCell;
    use std::collections::{BTreeMap, BTreeSet};
    use std::rc::Rc;

    use porter_domain::{
        OutputMap, Resource, ResourceGroup, ResourceName, ResourceOutcome,
    };
    use serde_json::{Value, json};

    use super::{ApplyOutcome, Driver, DriverFactory, Executor, Hook, Worker};
    use crate::error::{ApplyError, DriverError, HookError, ResolveError};
    use crate::resolve::{OutputTable, Resolver};

    type Events = Rc<RefCell<Vec<String>>>;

    struct EchoDriver {
        events: Events,
        output: OutputMap,
        fail: bool,
    }

    impl Driver for EchoDriver {
        fn apply(
            &mut self,
            resource: &Resource,
            outputs: &OutputTable,
        ) -> Result<ApplyOutcome, DriverError> {
            self.events
                .borrow_mut()
                .push(format!("apply {}", resource.name));
            if self.fail {
                return Err(DriverError::Resolve {
                    resource: resource.name.to_string(),
                    source: ResolveError::InvalidQuery {
                        query: "{ }".to_string(),
                        reason: "boom",
                    },
                });
            }
            let config = Resolver::for_dependencies(outputs, &resource.depends_on)
                .resolve_map(&resource.config)
                .map_err(|source| DriverError::Resolve {
                    resource: resource.name.to_string(),
                    source,
                })?;
            self.output = config;
            self.output
                .insert("name".to_string(), json!(resource.name.as_str()));
            Ok(ApplyOutcome::Applied)
        }

        fn output(&self) -> OutputMap {
            self.output.clone()
        }
    }

    fn echo_factory(events: &Events, failing: &'static [&'static str]) -> Box<dyn DriverFactory> {
        let events = Rc::clone(events);
        Box::new(move |resource: &Resource| -> Result<Box<dyn Driver>, DriverError> {
            Ok(Box::new(EchoDriver {
                events: Rc::clone(&events),
                output: OutputMap::new(),
                fail: failing.contains(&resource.name.as_str()),
            }))
        })
    }

    struct RecordingHook {
        events: Events,
        fail_pre: bool,
        query: Option<(String, Value)>,
    }

    impl Hook for RecordingHook {
        fn pre_apply(&mut self, _group: &ResourceGroup) -> Result<(), HookError> {
            self.events.borrow_mut().push("pre_apply".to_string());
            if self.fail_pre {
                return Err(HookError::EnvironmentNotFound);
            }
            Ok(())
        }

        fn data_queries(&self, _group: &ResourceGroup) -> BTreeMap<String, Value> {
            self.query.iter().cloned().collect()
        }

        fn post_apply(
            &mut self,
            _group: &ResourceGroup,
            populated: &BTreeMap<String, Value>,
        ) -> Result<(), HookError> {
            let populated: serde_json::Map<String, Value> = populated.clone().into_iter().collect();
            self.events
                .borrow_mut()
                .push(format!("post_apply {}", Value::Object(populated)));
            Ok(())
        }

        fn on_error(&mut self, error: &ApplyError) {
            self.events.borrow_mut().push(format!("on_error {error}"));
        }

        fn on_consolidated_errors(
            &mut self,
            _group: &ResourceGroup,
            errors: &BTreeMap<String, DriverError>,
            applied: &BTreeSet<String>,
        ) {
            let names: Vec<&str> = errors.keys().map(String::as_str).collect();
            let applied: Vec<&str> = applied.iter().map(String::as_str).collect();
            self.events.borrow_mut().push(format!(
                "on_consolidated_errors {} applied {}",
                names.join(","),
                applied.join(",")
            ));
        }
    }

    fn resource(name: &str, depends_on: &[&str], config: Value) -> Resource {
        let mut resource = Resource::new(ResourceName::try_from(name).expect("name"));
        resource.depends_on = depends_on.iter().map(|dep| (*dep).to_string()).collect();
        resource.config = config.as_object().cloned().unwrap_or_default();
        resource
    }

    fn group(resources: Vec<Resource>) -> ResourceGroup {
        let mut group = ResourceGroup::new("v1");
        group.resources = resources;
        group
    }

    fn worker(events: &Events, failing: &'static [&'static str], hook: RecordingHook) -> Worker {
        let mut worker = Worker::new();
        worker.register_driver("deploy", echo_factory(events, failing));
        worker.register_hook("recording", Box::new(hook));
        worker
    }

    fn hook(events: &Events) -> RecordingHook {
        RecordingHook {
            events: Rc::clone(events),
            fail_pre: false,
            query: None,
        }
    }

    #[test]
    fn applies_in_dependency_order_and_passes_outputs() {
        let events = Events::default();
        let mut hook = hook(&events);
        hook.query = Some(("web".to_string(), json!("{ .web.url }")));
        let mut worker = worker(&events, &[], hook);

        let report = worker.apply(&group(vec![
            resource("web", &["db"], json!({"url": "https://{ .db.host }"})),
            resource("db", &[], json!({"host": "db.internal"})),
        ]));

        assert!(!report.has_failures(), "{report:?}");
        assert_eq!(report.execution_order, vec!["db", "web"]);
        assert_eq!(
            *events.borrow(),
            vec![
                "pre_apply".to_string(),
                "apply db".to_string(),
                "apply web".to_string(),
                r#"post_apply {"web":"https://db.internal"}"#.to_string(),
            ]
        );
    }

    #[test]
    fn failed_resources_skip_dependents_and_consolidate_errors() {
        let events = Events::default();
        let mut worker = worker(&events, &["db"], hook(&events));

        let report = worker.apply(&group(vec![
            resource("db", &[], json!({})),
            resource("web", &["db"], json!({})),
            resource("cache", &[], json!({})),
        ]));

        assert!(report.has_failures());
        let outcomes: BTreeMap<&str, ResourceOutcome> = report
            .results
            .iter()
            .map(|result| (result.name.as_str(), result.outcome))
            .collect();
        assert_eq!(outcomes["db"], ResourceOutcome::Failed);
        assert_eq!(outcomes["web"], ResourceOutcome::Skipped);
        assert_eq!(outcomes["cache"], ResourceOutcome::Applied);

        let events = events.borrow();
        assert!(events.contains(&"on_consolidated_errors db applied cache".to_string()));
        assert!(!events.iter().any(|event| event.starts_with("post_apply")));
        assert!(!events.contains(&"apply web".to_string()));
    }

    #[test]
    fn pre_apply_failure_aborts_before_drivers_run() {
        let events = Events::default();
        let mut hook = hook(&events);
        hook.fail_pre = true;
        let mut worker = worker(&events, &[], hook);

        let report = worker.apply(&group(vec![resource("db", &[], json!({}))]));

        assert!(report.results.is_empty());
        assert_eq!(report.errors.len(), 1);
        let events = events.borrow();
        assert_eq!(events[0], "pre_apply");
        assert!(events[1].starts_with("on_error recording hook failed"));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn unknown_driver_fails_construction() {
        let events = Events::default();
        let mut worker = worker(&events, &[], hook(&events));
        let mut random = resource("secret", &[], json!({}));
        random.driver = Some("random-string".to_string());

        let report = worker.apply(&group(vec![random]));

        assert_eq!(
            report.errors,
            vec!["unknown driver \"random-string\" for resource secret".to_string()]
        );
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn cycles_are_run_level_errors() {
        let events = Events::default();
        let mut worker = worker(&events, &[], hook(&events));

        let report = worker.apply(&group(vec![
            resource("a", &["b"], json!({})),
            resource("b", &["a"], json!({})),
        ]));

        assert!(report.errors[0].contains("dependency cycle"));
        assert!(report.execution_order.is_empty());
    }

    #[test]
    fn default_driver_is_configurable() {
        let events = Events::default();
        let mut worker = Worker::new();
        worker.register_driver("os-env", echo_factory(&events, &[]));
        worker.set_default_driver("os-env");

        let report = worker.apply(&group(vec![resource("env", &[], json!({}))]));
        assert_eq!(report.results[0].driver, "os-env");
        assert_eq!(report.results[0].outcome, ResourceOutcome::Applied);
    }
}
