//! # In-Memory Gateway
//!
//! A [`ClusterGateway`] that keeps objects in memory, for tests and dry runs.
//!
//! It behaves like an API server where it matters to the deployer:
//! resource versions only move when content changes, a stale resource version
//! answers 409, updates replace the stored object and status survives spec
//! writes. Every mutating call is recorded.

use super::gateway::{keep_status, ClusterGateway, ObjectList, RawWatchEvent, WatchEventType};
use crate::error::{Error, Result};
use crate::model::Cluster;
use crate::resources::Kind;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::DynamicObject;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::broadcast;

type ObjectKey = (String, &'static str, String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    EnsureNamespace,
    Apply,
    Delete,
    LabelNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub op: WriteOp,
    pub cluster: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone)]
struct InjectedError {
    code: u16,
    message: String,
}

#[derive(Debug, Clone)]
struct FakeEvent {
    rv: u64,
    cluster: String,
    wire_kind: &'static str,
    namespace: String,
    event: RawWatchEvent,
}

/// What one watch call subscribed to
#[derive(Debug, Clone)]
struct WatchFilter {
    cluster: String,
    wire_kind: &'static str,
    namespace: String,
    selector: String,
}

impl WatchFilter {
    fn accepts(&self, ev: &FakeEvent) -> bool {
        ev.cluster == self.cluster
            && ev.wire_kind == self.wire_kind
            && ev.namespace == self.namespace
            && matches_selector(&ev.event.object, &self.selector)
    }
}

/// Events kept for watches resuming from an older resource version
const EVENT_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    namespaces: BTreeSet<(String, String)>,
    nodes: BTreeMap<(String, String), BTreeMap<String, String>>,
    writes: Vec<RecordedWrite>,
    apply_errors: BTreeMap<&'static str, VecDeque<InjectedError>>,
    resource_version: u64,
    log: VecDeque<FakeEvent>,
}

impl State {
    fn next_rv(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

#[derive(Debug)]
pub struct InMemoryGateway {
    state: Mutex<State>,
    /// `None` closes every open watch
    events: broadcast::Sender<Option<FakeEvent>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_error() -> Error {
    Error::Transient("in-memory gateway state poisoned".to_string())
}

fn key(cluster: &Cluster, kind: Kind, namespace: &str, name: &str) -> ObjectKey {
    let ns = if kind.is_namespaced() { namespace } else { "" };
    (
        cluster.name.clone(),
        kind.wire_kind(),
        ns.to_string(),
        name.to_string(),
    )
}

pub fn matches_selector(obj: &DynamicObject, selector: &str) -> bool {
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

impl InMemoryGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(State::default()),
            events,
        }
    }

    /// Mutating calls in the order they happened
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().map(|s| s.writes.clone()).unwrap_or_default()
    }

    pub fn applies_of(&self, kind: Kind) -> usize {
        self.writes()
            .iter()
            .filter(|w| w.op == WriteOp::Apply && w.kind == kind.wire_kind())
            .count()
    }

    pub fn has_namespace(&self, cluster: &str, namespace: &str) -> bool {
        self.state
            .lock()
            .map(|s| {
                s.namespaces
                    .contains(&(cluster.to_string(), namespace.to_string()))
            })
            .unwrap_or(false)
    }

    /// Fail the next apply of `kind` with an API error
    pub fn inject_apply_error(&self, kind: Kind, code: u16, message: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.apply_errors
                .entry(kind.wire_kind())
                .or_default()
                .push_back(InjectedError {
                    code,
                    message: message.to_string(),
                });
        }
    }

    /// Store `obj` as-is, bypassing apply semantics; emits a watch event
    pub fn insert(&self, cluster: &Cluster, kind: Kind, namespace: &str, mut obj: DynamicObject) {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let Ok(mut s) = self.state.lock() else {
            return;
        };
        let k = key(cluster, kind, namespace, &name);
        let type_ = if s.objects.contains_key(&k) {
            WatchEventType::Modified
        } else {
            WatchEventType::Added
        };
        obj.metadata.resource_version = Some(s.next_rv());
        obj.metadata.namespace = Some(namespace.to_string());
        s.objects.insert(k, obj.clone());
        self.emit(&mut s, cluster, kind, namespace, type_, obj);
    }

    /// Remove `name` without recording a write; emits a watch event
    pub fn remove(&self, cluster: &Cluster, kind: Kind, namespace: &str, name: &str) {
        let Ok(mut s) = self.state.lock() else {
            return;
        };
        if let Some(obj) = s.objects.remove(&key(cluster, kind, namespace, name)) {
            self.emit(&mut s, cluster, kind, namespace, WatchEventType::Deleted, obj);
        }
    }

    /// Replace the `status` of a stored custom resource, as the operator would
    pub fn set_status(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<()> {
        let mut s = self.state.lock().map_err(|_| lock_error())?;
        let rv = s.next_rv();
        let obj = s
            .objects
            .get_mut(&key(cluster, kind, namespace, name))
            .ok_or_else(|| Error::NotFound {
                kind: kind.as_str(),
                key: format!("{namespace}/{name}"),
            })?;
        if let Some(map) = obj.data.as_object_mut() {
            map.insert("status".to_string(), status);
        }
        obj.metadata.resource_version = Some(rv);
        let obj = obj.clone();
        self.emit(&mut s, cluster, kind, namespace, WatchEventType::Modified, obj);
        Ok(())
    }

    pub fn add_node(&self, cluster: &Cluster, node: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.nodes
                .insert((cluster.name.clone(), node.to_string()), BTreeMap::new());
        }
    }

    pub fn node_labels(&self, cluster: &Cluster, node: &str) -> BTreeMap<String, String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| {
                s.nodes
                    .get(&(cluster.name.clone(), node.to_string()))
                    .cloned()
            })
            .unwrap_or_default()
    }

    /// End every open watch stream, as an API server closing connections
    pub fn close_watches(&self) {
        let _ = self.events.send(None);
    }

    /// Log and broadcast a change. Runs under the state lock so a watch sees
    /// every event exactly once, either replayed or live.
    fn emit(
        &self,
        state: &mut State,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        type_: WatchEventType,
        mut object: DynamicObject,
    ) {
        if type_ == WatchEventType::Deleted {
            object.metadata.resource_version = Some(state.next_rv());
        }
        let event = FakeEvent {
            rv: state.resource_version,
            cluster: cluster.name.clone(),
            wire_kind: kind.wire_kind(),
            namespace: namespace.to_string(),
            event: RawWatchEvent { type_, object },
        };
        if state.log.len() == EVENT_LOG_CAPACITY {
            state.log.pop_front();
        }
        state.log.push_back(event.clone());
        // No receivers is fine: nobody is watching
        let _ = self.events.send(Some(event));
    }

    fn record(state: &mut State, op: WriteOp, cluster: &Cluster, kind: &str, ns: &str, name: &str) {
        state.writes.push(RecordedWrite {
            op,
            cluster: cluster.name.clone(),
            kind: kind.to_string(),
            namespace: ns.to_string(),
            name: name.to_string(),
        });
    }
}

#[async_trait]
impl ClusterGateway for InMemoryGateway {
    async fn ensure_namespace(&self, cluster: &Cluster, namespace: &str) -> Result<()> {
        let mut s = self.state.lock().map_err(|_| lock_error())?;
        Self::record(&mut s, WriteOp::EnsureNamespace, cluster, "Namespace", namespace, namespace);
        s.namespaces
            .insert((cluster.name.clone(), namespace.to_string()));
        Ok(())
    }

    async fn get(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let s = self.state.lock().map_err(|_| lock_error())?;
        Ok(s.objects.get(&key(cluster, kind, namespace, name)).cloned())
    }

    async fn apply(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        mut obj: DynamicObject,
    ) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let mut s = self.state.lock().map_err(|_| lock_error())?;
        Self::record(&mut s, WriteOp::Apply, cluster, kind.wire_kind(), namespace, &name);

        if let Some(err) = s
            .apply_errors
            .get_mut(kind.wire_kind())
            .and_then(VecDeque::pop_front)
        {
            return Err(Error::Api {
                code: err.code,
                reason: "Injected".to_string(),
                message: err.message,
            });
        }

        let k = key(cluster, kind, namespace, &name);
        obj.metadata.namespace = kind.is_namespaced().then(|| namespace.to_string());

        let (stored, type_) = match s.objects.get(&k).cloned() {
            None => {
                obj.metadata.resource_version = Some(s.next_rv());
                (obj, WatchEventType::Added)
            }
            Some(existing) => {
                let current_rv = existing.metadata.resource_version.clone();
                if obj.metadata.resource_version.is_some() && obj.metadata.resource_version != current_rv {
                    return Err(Error::Api {
                        code: 409,
                        reason: "Conflict".to_string(),
                        message: format!(
                            "Operation cannot be fulfilled on {} \"{name}\": the object has been modified",
                            kind.wire_kind()
                        ),
                    });
                }

                let mut next = obj;
                if kind.is_custom() {
                    keep_status(&mut next, &existing);
                }

                next.metadata.resource_version = current_rv;
                if serde_json::to_value(&next)? == serde_json::to_value(&existing)? {
                    return Ok(existing);
                }
                next.metadata.resource_version = Some(s.next_rv());
                (next, WatchEventType::Modified)
            }
        };

        s.objects.insert(k, stored.clone());
        self.emit(&mut s, cluster, kind, namespace, type_, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<bool> {
        let mut s = self.state.lock().map_err(|_| lock_error())?;
        Self::record(&mut s, WriteOp::Delete, cluster, kind.wire_kind(), namespace, name);
        match s.objects.remove(&key(cluster, kind, namespace, name)) {
            Some(obj) => {
                self.emit(&mut s, cluster, kind, namespace, WatchEventType::Deleted, obj);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<ObjectList> {
        let s = self.state.lock().map_err(|_| lock_error())?;
        let items = s
            .objects
            .iter()
            .filter(|((c, k, ns, _), _)| {
                *c == cluster.name && *k == kind.wire_kind() && ns == namespace
            })
            .map(|(_, obj)| obj)
            .filter(|obj| matches_selector(obj, label_selector))
            .cloned()
            .collect();
        Ok(ObjectList {
            items,
            resource_version: s.resource_version.to_string(),
        })
    }

    /// Replays logged events newer than `resource_version`, then follows live
    /// changes. A resource version that is not a number starts at now.
    async fn watch(
        &self,
        cluster: &Cluster,
        kind: Kind,
        namespace: &str,
        label_selector: &str,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<RawWatchEvent>>> {
        let filter = WatchFilter {
            cluster: cluster.name.clone(),
            wire_kind: kind.wire_kind(),
            namespace: namespace.to_string(),
            selector: label_selector.to_string(),
        };

        let (backlog, rx) = {
            let s = self.state.lock().map_err(|_| lock_error())?;
            let backlog: Vec<RawWatchEvent> = match resource_version.parse::<u64>() {
                Ok(since) => s
                    .log
                    .iter()
                    .filter(|ev| ev.rv > since && filter.accepts(ev))
                    .map(|ev| ev.event.clone())
                    .collect(),
                Err(_) => Vec::new(),
            };
            (backlog, self.events.subscribe())
        };

        let live = futures::stream::unfold(rx, move |mut rx| {
            let filter = filter.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(Some(ev)) => {
                            if filter.accepts(&ev) {
                                return Some((Ok(ev.event), rx));
                            }
                        }
                        Ok(None) | Err(broadcast::error::RecvError::Closed) => return None,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            return Some((
                                Err(Error::Transient(format!("watch lagged by {n} events"))),
                                rx,
                            ))
                        }
                    }
                }
            }
        });
        Ok(futures::stream::iter(backlog.into_iter().map(Ok))
            .chain(live)
            .boxed())
    }

    async fn list_nodes(&self, cluster: &Cluster) -> Result<Vec<String>> {
        let s = self.state.lock().map_err(|_| lock_error())?;
        Ok(s.nodes
            .keys()
            .filter(|(c, _)| *c == cluster.name)
            .map(|(_, n)| n.clone())
            .collect())
    }

    async fn label_node(
        &self,
        cluster: &Cluster,
        node: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let mut s = self.state.lock().map_err(|_| lock_error())?;
        Self::record(&mut s, WriteOp::LabelNode, cluster, "Node", "", node);
        let labels = s
            .nodes
            .get_mut(&(cluster.name.clone(), node.to_string()))
            .ok_or_else(|| Error::NotFound {
                kind: "Node",
                key: node.to_string(),
            })?;
        match value {
            Some(v) => labels.insert(key.to_string(), v.to_string()),
            None => labels.remove(key),
        };
        Ok(())
    }
}
