//! Differences between two consecutive process snapshots, rendered as
//! deployment log lines.

use super::model::{Instance, Process};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessEventType {
    Created,
    Removed,
    UpdatedReplicas,
    UpdatedCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessEvent {
    #[serde(rename = "type")]
    pub type_: ProcessEventType,
    pub process: Process,
    /// Value before the update
    pub previous: Option<String>,
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.process;
        match self.type_ {
            ProcessEventType::Created => {
                write!(f, "Process {} created, replicas: {}", p.name, p.replicas)
            }
            ProcessEventType::Removed => write!(f, "Process {} removed", p.name),
            ProcessEventType::UpdatedReplicas => write!(
                f,
                "Process {} scaled from {} to {} replicas",
                p.name,
                self.previous.as_deref().unwrap_or("?"),
                p.replicas
            ),
            ProcessEventType::UpdatedCommand => {
                write!(f, "Process {} command changed to `{}`", p.name, p.command)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcInstEventType {
    Created,
    Removed,
    UpdatedRestarted,
    UpdatedBecomeReady,
    UpdatedBecomeNotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcInstEvent {
    #[serde(rename = "type")]
    pub type_: ProcInstEventType,
    pub instance: Instance,
}

impl fmt::Display for ProcInstEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let i = &self.instance;
        match self.type_ {
            ProcInstEventType::Created => {
                write!(f, "Instance {} of process {} created", i.name, i.process_type)
            }
            ProcInstEventType::Removed => {
                write!(f, "Instance {} of process {} removed", i.name, i.process_type)
            }
            ProcInstEventType::UpdatedRestarted => write!(
                f,
                "Instance {} restarted, restart count: {}",
                i.name, i.restart_count
            ),
            ProcInstEventType::UpdatedBecomeReady => write!(f, "Instance {} is ready", i.name),
            ProcInstEventType::UpdatedBecomeNotReady => {
                write!(f, "Instance {} is not ready, state: {}", i.name, i.state)
            }
        }
    }
}

/// Process events turning `old` into `new`, ordered by process name
pub fn diff_processes(old: &[Process], new: &[Process]) -> Vec<ProcessEvent> {
    let old: BTreeMap<&str, &Process> = old.iter().map(|p| (p.name.as_str(), p)).collect();
    let new: BTreeMap<&str, &Process> = new.iter().map(|p| (p.name.as_str(), p)).collect();
    let mut events = Vec::new();

    for (name, p) in &new {
        let event = |type_, previous| ProcessEvent {
            type_,
            process: (*p).clone(),
            previous,
        };
        match old.get(name) {
            None => events.push(event(ProcessEventType::Created, None)),
            Some(before) => {
                if before.replicas != p.replicas {
                    events.push(event(
                        ProcessEventType::UpdatedReplicas,
                        Some(before.replicas.to_string()),
                    ));
                }
                if before.command != p.command {
                    events.push(event(
                        ProcessEventType::UpdatedCommand,
                        Some(before.command.clone()),
                    ));
                }
            }
        }
    }
    for (name, p) in &old {
        if !new.contains_key(name) {
            events.push(ProcessEvent {
                type_: ProcessEventType::Removed,
                process: (*p).clone(),
                previous: None,
            });
        }
    }
    events
}

/// Instance events turning `old` into `new`, ordered by instance name
pub fn diff_instances(old: &[Instance], new: &[Instance]) -> Vec<ProcInstEvent> {
    let old: BTreeMap<&str, &Instance> = old.iter().map(|i| (i.name.as_str(), i)).collect();
    let new: BTreeMap<&str, &Instance> = new.iter().map(|i| (i.name.as_str(), i)).collect();
    let mut events = Vec::new();

    for (name, i) in &new {
        let event = |type_| ProcInstEvent {
            type_,
            instance: (*i).clone(),
        };
        match old.get(name) {
            None => events.push(event(ProcInstEventType::Created)),
            Some(before) => {
                if i.restart_count > before.restart_count {
                    events.push(event(ProcInstEventType::UpdatedRestarted));
                }
                match (before.ready, i.ready) {
                    (false, true) => events.push(event(ProcInstEventType::UpdatedBecomeReady)),
                    (true, false) => events.push(event(ProcInstEventType::UpdatedBecomeNotReady)),
                    _ => {}
                }
            }
        }
    }
    for (name, i) in &old {
        if !new.contains_key(name) {
            events.push(ProcInstEvent {
                type_: ProcInstEventType::Removed,
                instance: (*i).clone(),
            });
        }
    }
    events
}
