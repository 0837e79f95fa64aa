//! In-memory stand-ins for every collaborator, sharing one observable world.

#![allow(dead_code)]

use async_trait::async_trait;
use idp_core::{
    DataStoreError, ExecutionError, OperationalDataStore, ResourceKind, ResourceRef, StepResult,
};
use orchestrator::{
    Applied, Clock, ClusterClient, ClusterError, ClusterResult, Collaborators, ContainerBuilder,
    DashboardDescriptor, DashboardProvisioner, DeclarativeConfigController, DeleteOptions,
    Deletion, IdpConfig, LifecycleOrchestrator, Lookup, ObservedResource, TemplateSet,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vcs::{CommitOutcome, VcsError, VersionControl};

pub const CONTROLLER_NAMESPACE: &str = "argocd";

/// A step a fake can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Build,
    Import,
    Push,
    DashboardApply,
    DashboardDestroy,
    DataStore,
}

#[derive(Default)]
struct State {
    log: Vec<String>,
    objects: HashMap<ResourceRef, ObservedResource>,
    /// Value of each object's `coin` label.
    coin_labels: HashMap<ResourceRef, String>,
    auto_sync: HashSet<String>,
    /// Deleting these leaves them terminating.
    held: HashSet<ResourceRef>,
    /// Brought back once by the next lookup after they were deleted.
    reappear: HashSet<ResourceRef>,
    deleted: HashSet<ResourceRef>,
    faults: HashSet<Fault>,
    records: HashMap<String, u64>,
    dashboards: HashSet<String>,
    commits: Vec<String>,
    committed_tree: BTreeMap<PathBuf, Vec<u8>>,
    pushes: usize,
}

pub struct World {
    dir: TempDir,
    state: Mutex<State>,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dir: TempDir::new().unwrap(),
            state: Mutex::new(State::default()),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn fail(&self, fault: Fault) {
        self.state.lock().unwrap().faults.insert(fault);
    }

    pub fn hold(&self, resource: ResourceRef) {
        self.state.lock().unwrap().held.insert(resource);
    }

    pub fn reappear_once(&self, resource: ResourceRef) {
        self.state.lock().unwrap().reappear.insert(resource);
    }

    pub fn seed_records(&self, symbol: &str, count: u64) {
        self.state
            .lock()
            .unwrap()
            .records
            .insert(symbol.to_string(), count);
    }

    pub fn records(&self, symbol: &str) -> u64 {
        self.state
            .lock()
            .unwrap()
            .records
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    /// Index of the first log entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.log().iter().position(|entry| entry.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    pub fn exists(&self, resource: &ResourceRef) -> bool {
        self.state.lock().unwrap().objects.contains_key(resource)
    }

    /// Every live object whose name or namespace mentions `needle`.
    pub fn objects_matching(&self, needle: &str) -> Vec<ResourceRef> {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|r| {
                r.name.contains(needle)
                    || r.namespace.as_deref().is_some_and(|ns| ns.contains(needle))
            })
            .cloned()
            .collect()
    }

    pub fn application(name: &str) -> ResourceRef {
        ResourceRef::namespaced(ResourceKind::Application, name, CONTROLLER_NAMESPACE)
    }

    pub fn auto_sync(&self, application: &str) -> bool {
        self.state.lock().unwrap().auto_sync.contains(application)
    }

    pub fn dashboards(&self) -> Vec<String> {
        self.state.lock().unwrap().dashboards.iter().cloned().collect()
    }

    pub fn commits(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn pushes(&self) -> usize {
        self.state.lock().unwrap().pushes
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            builder: Arc::new(FakeBuilder(self.clone())),
            cluster: Arc::new(FakeCluster(self.clone())),
            controller: Arc::new(FakeController(self.clone())),
            vcs: Arc::new(FakeVcs(self.clone())),
            dashboards: Arc::new(FakeDashboards(self.clone())),
            datastore: Arc::new(FakeDataStore(self.clone())),
            clock: Arc::new(ManualClock::new()),
        }
    }

    pub fn orchestrator(self: &Arc<Self>, config: IdpConfig) -> LifecycleOrchestrator {
        LifecycleOrchestrator::new(
            self.root(),
            config,
            self.collaborators(),
            TemplateSet::builtin(),
        )
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }

    fn faulted(&self, fault: Fault) -> bool {
        self.state.lock().unwrap().faults.contains(&fault)
    }

    fn lookup(&self, resource: &ResourceRef) -> Lookup {
        let mut state = self.state.lock().unwrap();
        if !state.objects.contains_key(resource)
            && state.deleted.contains(resource)
            && state.reappear.remove(resource)
        {
            state.objects.insert(resource.clone(), ready());
        }
        match state.objects.get(resource) {
            Some(observed) => Lookup::Found(observed.clone()),
            None => Lookup::NotFound,
        }
    }

    fn delete(&self, resource: &ResourceRef) -> Deletion {
        let mut state = self.state.lock().unwrap();
        if !state.objects.contains_key(resource) {
            return Deletion::AlreadyAbsent;
        }

        if resource.kind == ResourceKind::Namespace {
            let contained: Vec<ResourceRef> = state
                .objects
                .keys()
                .filter(|r| r.namespace.as_deref() == Some(resource.name.as_str()))
                .cloned()
                .collect();
            for r in contained {
                state.objects.remove(&r);
                state.deleted.insert(r);
            }
        }

        if state.held.contains(resource) {
            if let Some(observed) = state.objects.get_mut(resource) {
                observed.terminating = true;
            }
        } else {
            state.objects.remove(resource);
            state.deleted.insert(resource.clone());
        }
        Deletion::Requested
    }

    /// Create every object described under the application's manifests directory.
    fn reconcile(&self, application: &str) {
        let dir = self.root().join("gitops/manifests").join(application);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return;
        };
        for entry in entries.flatten() {
            let content = std::fs::read_to_string(entry.path()).unwrap();
            if let Some(resource) = parse_manifest(&content) {
                self.state
                    .lock()
                    .unwrap()
                    .objects
                    .insert(resource, ready());
            }
        }
    }

    fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut tree = BTreeMap::new();
        walk(self.root(), self.root(), &mut tree);
        tree
    }
}

fn walk(root: &Path, dir: &Path, tree: &mut BTreeMap<PathBuf, Vec<u8>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap().to_path_buf();
        if relative.starts_with(".idp") || relative.starts_with(".git") {
            continue;
        }
        if path.is_dir() {
            walk(root, &path, tree);
        } else {
            tree.insert(relative, std::fs::read(&path).unwrap());
        }
    }
}

fn ready() -> ObservedResource {
    ObservedResource {
        terminating: false,
        ready: true,
        phase: None,
    }
}

/// Value of the first `<key>:` label line of a manifest.
pub fn manifest_label(manifest: &str, key: &str) -> Option<String> {
    let prefix = format!("{}:", key);
    manifest
        .lines()
        .filter(|line| line.starts_with("    "))
        .find_map(|line| line.trim().strip_prefix(prefix.as_str()))
        .map(|value| value.trim().to_string())
}

/// Kind, name and namespace of a single-document manifest.
pub fn parse_manifest(manifest: &str) -> Option<ResourceRef> {
    let field = |prefix: &str| {
        manifest
            .lines()
            .find_map(|line| line.strip_prefix(prefix))
            .map(|value| value.trim().to_string())
    };

    let kind = match field("kind:")?.as_str() {
        "Deployment" => ResourceKind::Deployment,
        "Service" => ResourceKind::Service,
        "ConfigMap" => ResourceKind::ConfigMap,
        "PersistentVolume" => ResourceKind::PersistentVolume,
        "PersistentVolumeClaim" => ResourceKind::PersistentVolumeClaim,
        "Application" => ResourceKind::Application,
        _ => return None,
    };
    let name = field("  name:")?;
    Some(match field("  namespace:") {
        Some(ns) => ResourceRef::namespaced(kind, name, ns),
        None => ResourceRef::cluster(kind, name),
    })
}

fn failed(operation: &str, stderr: &str) -> ExecutionError {
    ExecutionError::Failed {
        operation: operation.to_string(),
        exit_code: 1,
        stderr: stderr.to_string(),
    }
}

/// Time that advances only when something sleeps.
pub struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

pub struct FakeBuilder(Arc<World>);

#[async_trait]
impl ContainerBuilder for FakeBuilder {
    async fn build(&self, image_tag: &str, build_context: &Path) -> Result<(), ExecutionError> {
        self.0.record(format!("builder build {}", image_tag));
        if self.0.faulted(Fault::Build) {
            return Err(failed("docker build", "Cannot connect to the Docker daemon"));
        }
        assert!(
            self.0.root().join(build_context).join("Dockerfile").exists(),
            "build context has no Dockerfile"
        );
        Ok(())
    }

    async fn import_into_cluster(&self, image_tag: &str) -> Result<(), ExecutionError> {
        self.0.record(format!("builder import {}", image_tag));
        if self.0.faulted(Fault::Import) {
            return Err(failed("kind load docker-image", "no nodes found for cluster"));
        }
        Ok(())
    }
}

pub struct FakeCluster(Arc<World>);

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_namespace(&self, name: &str) -> ClusterResult<Applied> {
        self.0.record(format!("cluster create_namespace {}", name));
        let resource = ResourceRef::namespace(name);
        let mut state = self.0.state.lock().unwrap();
        if state.objects.contains_key(&resource) {
            return Ok(Applied::AlreadyExists);
        }
        state.objects.insert(resource, ready());
        Ok(Applied::Created)
    }

    async fn apply_manifest(&self, manifest: &str) -> ClusterResult<()> {
        let resource = parse_manifest(manifest).ok_or_else(|| ClusterError::Parse {
            operation: "kubectl apply".to_string(),
            reason: "unrecognized manifest".to_string(),
        })?;
        self.0.record(format!(
            "cluster apply {}/{}",
            resource.kind.as_str(),
            resource.name
        ));
        let mut state = self.0.state.lock().unwrap();
        if let Some(coin) = manifest_label(manifest, "coin") {
            state.coin_labels.insert(resource.clone(), coin);
        }
        state.objects.insert(resource, ready());
        Ok(())
    }

    async fn delete_resource(
        &self,
        resource: &ResourceRef,
        options: DeleteOptions,
    ) -> ClusterResult<Deletion> {
        self.0.record(format!(
            "cluster delete {}/{}{}",
            resource.kind.as_str(),
            resource.name,
            if options.force { " force" } else { "" }
        ));
        Ok(self.0.delete(resource))
    }

    async fn get_resource(&self, resource: &ResourceRef) -> ClusterResult<Lookup> {
        Ok(self.0.lookup(resource))
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> ClusterResult<Vec<ResourceRef>> {
        let coin = selector.and_then(|s| s.strip_prefix("coin="));
        let state = self.0.state.lock().unwrap();
        let mut found: Vec<ResourceRef> = state
            .objects
            .keys()
            .filter(|r| r.kind == kind)
            .filter(|r| namespace.is_none() || r.namespace.as_deref() == namespace)
            .filter(|r| match coin {
                Some(coin) => state.coin_labels.get(*r).map(String::as_str) == Some(coin),
                None => true,
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn wait_for_condition(
        &self,
        resource: &ResourceRef,
        condition: &str,
        _timeout: Duration,
    ) -> ClusterResult<bool> {
        let lookup = self.0.lookup(resource);
        Ok(match condition {
            "delete" => !lookup.exists(),
            _ => lookup.exists(),
        })
    }

    async fn restart_workload(&self, resource: &ResourceRef) -> ClusterResult<()> {
        self.0.record(format!(
            "cluster restart {}/{}",
            resource.kind.as_str(),
            resource.name
        ));
        Ok(())
    }

    async fn find_pod(&self, _namespace: &str, _selector: &str) -> ClusterResult<Option<String>> {
        Ok(None)
    }

    async fn exec(
        &self,
        _namespace: &str,
        pod: &str,
        command: &[String],
    ) -> ClusterResult<StepResult> {
        Ok(StepResult {
            command: format!("kubectl exec {} -- {}", pod, command.join(" ")),
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

pub struct FakeController(Arc<World>);

#[async_trait]
impl DeclarativeConfigController for FakeController {
    async fn apply(&self, descriptor: &Path) -> ClusterResult<()> {
        let content = std::fs::read_to_string(self.0.root().join(descriptor)).map_err(|e| {
            ClusterError::Transport {
                operation: format!("kubectl apply -f {}", descriptor.display()),
                stderr: e.to_string(),
            }
        })?;
        let resource = parse_manifest(&content).ok_or_else(|| ClusterError::Parse {
            operation: "kubectl apply".to_string(),
            reason: "not an application".to_string(),
        })?;
        self.0.record(format!("controller apply {}", resource.name));

        let mut state = self.0.state.lock().unwrap();
        state.auto_sync.insert(resource.name.clone());
        state.objects.insert(resource, ready());
        Ok(())
    }

    async fn force_refresh(&self, name: &str) -> ClusterResult<()> {
        self.0.record(format!("controller refresh {}", name));
        if !self.0.lookup(&World::application(name)).exists() {
            return Err(ClusterError::Transport {
                operation: format!("kubectl annotate application {}", name),
                stderr: format!("applications.argoproj.io \"{}\" not found", name),
            });
        }
        if self.0.auto_sync(name) {
            self.0.reconcile(name);
        }
        Ok(())
    }

    async fn delete(&self, name: &str, options: DeleteOptions) -> ClusterResult<Deletion> {
        self.0.record(format!(
            "controller delete {}{}",
            name,
            if options.force { " force" } else { "" }
        ));
        Ok(self.0.delete(&World::application(name)))
    }

    async fn patch(&self, name: &str, field: &str, value: serde_json::Value) -> ClusterResult<bool> {
        self.0
            .record(format!("controller patch {} {}={}", name, field, value));
        if !self.0.lookup(&World::application(name)).exists() {
            return Ok(false);
        }
        if field == "spec.syncPolicy.automated" && value.is_null() {
            self.0.state.lock().unwrap().auto_sync.remove(name);
        }
        Ok(true)
    }

    async fn get(&self, name: &str) -> ClusterResult<Lookup> {
        Ok(self.0.lookup(&World::application(name)))
    }
}

pub struct FakeVcs(Arc<World>);

#[async_trait]
impl VersionControl for FakeVcs {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn is_initialized(&self) -> vcs::Result<bool> {
        Ok(true)
    }

    async fn stage_all(&self) -> vcs::Result<()> {
        self.0.record("vcs stage".to_string());
        Ok(())
    }

    async fn commit(&self, message: &str) -> vcs::Result<CommitOutcome> {
        self.0.record(format!("vcs commit {}", message));
        let tree = self.0.snapshot();
        let mut state = self.0.state.lock().unwrap();
        if tree == state.committed_tree {
            return Ok(CommitOutcome::NothingToCommit);
        }
        state.committed_tree = tree;
        state.commits.push(message.to_string());
        Ok(CommitOutcome::Committed {
            sha: format!("{:040x}", state.commits.len()),
        })
    }

    async fn push(&self) -> vcs::Result<()> {
        self.0.record("vcs push".to_string());
        if self.0.faulted(Fault::Push) {
            return Err(VcsError::CommandFailed(
                "git push: remote rejected".to_string(),
            ));
        }
        self.0.state.lock().unwrap().pushes += 1;
        Ok(())
    }
}

pub struct FakeDashboards(Arc<World>);

#[async_trait]
impl DashboardProvisioner for FakeDashboards {
    async fn apply(&self, dashboard: &DashboardDescriptor) -> Result<(), ExecutionError> {
        self.0.record(format!("dashboards apply {}", dashboard.resource));
        if self.0.faulted(Fault::DashboardApply) {
            return Err(failed("terraform apply", "grafana unreachable"));
        }
        self.0
            .state
            .lock()
            .unwrap()
            .dashboards
            .insert(dashboard.resource.clone());
        Ok(())
    }

    async fn destroy(&self, dashboard: &DashboardDescriptor) -> Result<(), ExecutionError> {
        self.0.record(format!("dashboards destroy {}", dashboard.resource));
        if self.0.faulted(Fault::DashboardDestroy) {
            return Err(failed("terraform destroy", "grafana unreachable"));
        }
        self.0
            .state
            .lock()
            .unwrap()
            .dashboards
            .remove(&dashboard.resource);
        Ok(())
    }
}

pub struct FakeDataStore(Arc<World>);

#[async_trait]
impl OperationalDataStore for FakeDataStore {
    async fn delete_records(&self, symbol: &str) -> Result<u64, DataStoreError> {
        self.0.record(format!("datastore delete {}", symbol));
        if self.0.faulted(Fault::DataStore) {
            return Err(DataStoreError::Unavailable(
                "no ingestor pod running".to_string(),
            ));
        }
        Ok(self
            .0
            .state
            .lock()
            .unwrap()
            .records
            .remove(symbol)
            .unwrap_or(0))
    }
}
