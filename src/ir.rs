// Copyright 2025 Cornell University
// released under MIT License

use cranelift_entity::{entity_impl, EntityRef, PrimaryMap};
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::Index;

#[derive(Clone, Copy, Hash, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct ProcessId(u32);
entity_impl!(ProcessId, "proc");

#[derive(Clone, Copy, Hash, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct StateId(u32);
entity_impl!(StateId, "state");

#[derive(Clone, Copy, Hash, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct ChannelId(u32);
entity_impl!(ChannelId, "chan");

/// Direction of a channel action
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Op {
    Send,
    Receive,
}

impl Op {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '!' => Some(Op::Send),
            '?' => Some(Op::Receive),
            _ => None,
        }
    }
}

/// A send or receive on a channel. Lower `priority` values are more urgent.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Action {
    pub channel: ChannelId,
    pub op: Op,
    pub priority: i32,
}

impl Action {
    pub fn new(channel: ChannelId, op: Op, priority: i32) -> Self {
        Self {
            channel,
            op,
            priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct State {
    label: String,
    /// outgoing actions in declaration order
    trans: Vec<(Action, StateId)>,
}

/// A single automaton. Every label it mentions is interned as a state,
/// the first interned label is the initial state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Process {
    is_buffer: bool,
    states: PrimaryMap<StateId, State>,
    by_label: FxHashMap<String, StateId>,
    /// states with at least one outgoing action, in order of their first action
    sources: Vec<StateId>,
}

impl Process {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_buffer() -> Self {
        Self {
            is_buffer: true,
            ..Default::default()
        }
    }

    pub fn is_buffer(&self) -> bool {
        self.is_buffer
    }

    /// Returns the id of `label`, adding it if it has not been seen yet.
    pub fn state(&mut self, label: &str) -> StateId {
        if let Some(id) = self.by_label.get(label) {
            return *id;
        }
        let id = self.states.push(State {
            label: label.to_string(),
            trans: Vec::new(),
        });
        self.by_label.insert(label.to_string(), id);
        id
    }

    pub fn state_id(&self, label: &str) -> Option<StateId> {
        self.by_label.get(label).copied()
    }

    /// Adds `from --action--> to`. Returns `false` (and leaves the process
    /// unchanged) if `from` already has an identical action.
    pub fn add_action(&mut self, from: StateId, action: Action, to: StateId) -> bool {
        let trans = &mut self.states[from].trans;
        if trans.iter().any(|(a, _)| *a == action) {
            return false;
        }
        if trans.is_empty() {
            self.sources.push(from);
        }
        trans.push((action, to));
        true
    }

    pub fn initial(&self) -> Option<StateId> {
        self.states.keys().next()
    }

    pub fn transitions(&self, state: StateId) -> &[(Action, StateId)] {
        &self.states[state].trans
    }

    pub fn label(&self, state: StateId) -> &str {
        &self.states[state].label
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.states.values().map(|s| s.label.as_str())
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// States that have outgoing actions, in order of their first action.
    pub fn sources(&self) -> impl Iterator<Item = StateId> + '_ {
        self.sources.iter().copied()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Every action, grouped by source state.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.sources()
            .flat_map(move |s| self.states[s].trans.iter().map(|(a, _)| a))
    }
}

/// An ordered collection of uniquely named processes together with the
/// channels their actions refer to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Network {
    names: PrimaryMap<ProcessId, String>,
    procs: PrimaryMap<ProcessId, Process>,
    by_name: FxHashMap<String, ProcessId>,
    channels: PrimaryMap<ChannelId, String>,
    channels_by_name: FxHashMap<String, ChannelId>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of channel `name`, adding it if it has not been seen yet.
    pub fn channel(&mut self, name: &str) -> ChannelId {
        if let Some(id) = self.channels_by_name.get(name) {
            return *id;
        }
        let id = self.channels.push(name.to_string());
        self.channels_by_name.insert(name.to_string(), id);
        id
    }

    pub fn channel_id(&self, name: &str) -> Option<ChannelId> {
        self.channels_by_name.get(name).copied()
    }

    pub fn channel_name(&self, id: ChannelId) -> &str {
        &self.channels[id]
    }

    /// Adds a process. Returns `None` if the name is already taken.
    pub fn add_process(&mut self, name: String, proc: Process) -> Option<ProcessId> {
        if self.by_name.contains_key(&name) {
            return None;
        }
        let id = self.procs.push(proc);
        let name_id = self.names.push(name.clone());
        debug_assert_eq!(id, name_id);
        self.by_name.insert(name, id);
        Some(id)
    }

    pub fn contains_process(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn process_id(&self, name: &str) -> Option<ProcessId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: ProcessId) -> &str {
        &self.names[id]
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn processes(&self) -> impl Iterator<Item = (ProcessId, &Process)> {
        self.procs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(|n| n.as_str())
    }

    /// Channels referenced by at least one action. Ordered by process, then
    /// source state, then action.
    pub fn channels(&self) -> Vec<&str> {
        let mut seen = vec![false; self.channels.len()];
        let mut channels = Vec::new();
        for action in self.procs.values().flat_map(Process::actions) {
            let id = action.channel;
            if !seen[id.index()] {
                seen[id.index()] = true;
                channels.push(self.channels[id].as_str());
            }
        }
        channels
    }

    /// Whether any action anywhere carries a non-default priority.
    pub fn has_priorities(&self) -> bool {
        self.procs
            .values()
            .any(|p| p.actions().any(|a| a.priority != 0))
    }
}

impl Index<ProcessId> for Network {
    type Output = Process;

    fn index(&self, index: ProcessId) -> &Self::Output {
        &self.procs[index]
    }
}

impl Index<&str> for Network {
    type Output = Process;

    fn index(&self, index: &str) -> &Self::Output {
        &self.procs[self.by_name[index]]
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (id, proc) in self.procs.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}[{}]", self.names[id], proc.source_count())?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// `P0: s0 c! s1 .` and `P1: s0 c? s1 .`
    pub fn build_handshake() -> Network {
        let mut net = Network::new();
        let c = net.channel("c");

        let mut p0 = Process::new();
        let (s0, s1) = (p0.state("s0"), p0.state("s1"));
        assert!(p0.add_action(s0, Action::new(c, Op::Send, 0), s1));
        net.add_process("P0".to_string(), p0).unwrap();

        let mut p1 = Process::new();
        let (s0, s1) = (p1.state("s0"), p1.state("s1"));
        assert!(p1.add_action(s0, Action::new(c, Op::Receive, 0), s1));
        net.add_process("P1".to_string(), p1).unwrap();
        net
    }

    #[test]
    fn test_process_interning() {
        let mut p = Process::new();
        let a = p.state("a");
        let b = p.state("b");
        assert_eq!(p.state("a"), a);
        assert_eq!(p.initial(), Some(a));
        assert_eq!(p.label(b), "b");
        assert_eq!(p.state_count(), 2);
        assert_eq!(p.state_id("c"), None);
    }

    #[test]
    fn test_duplicate_action_rejected() {
        let mut net = Network::new();
        let c = net.channel("c");
        let mut p = Process::new();
        let (s0, s1) = (p.state("s0"), p.state("s1"));
        assert!(p.add_action(s0, Action::new(c, Op::Send, 0), s1));
        assert!(!p.add_action(s0, Action::new(c, Op::Send, 0), s0));
        // a different priority makes a different action
        assert!(p.add_action(s0, Action::new(c, Op::Send, 1), s0));
        assert_eq!(p.transitions(s0).len(), 2);
    }

    #[test]
    fn test_network_summary() {
        let mut net = build_handshake();
        // `s1` has no outgoing action and is not counted
        assert_eq!(net.to_string(), "P0[1] P1[1]");
        assert_eq!(net.channels(), vec!["c"]);
        assert!(!net.has_priorities());
        // an interned but unused channel is not listed
        net.channel("unused");
        assert_eq!(net.channels().len(), 1);
        assert!(net.add_process("P0".to_string(), Process::new()).is_none());
        assert_eq!(net["P1"].state_count(), 2);
        assert_eq!(net["P1"].source_count(), 1);
    }

    #[test]
    fn test_sources_in_first_action_order() {
        let mut net = Network::new();
        let (x, y, z) = (net.channel("x"), net.channel("y"), net.channel("z"));
        let mut p = Process::new();
        let (a, c, b) = (p.state("a"), p.state("c"), p.state("b"));
        p.add_action(a, Action::new(x, Op::Send, 0), c);
        p.add_action(b, Action::new(y, Op::Send, 0), a);
        p.add_action(c, Action::new(z, Op::Send, 0), a);
        p.add_action(a, Action::new(z, Op::Receive, 0), a);
        assert_eq!(p.sources().collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(p.state_count(), 3);
        net.add_process("P".to_string(), p).unwrap();
        assert_eq!(net.channels(), vec!["x", "z", "y"]);
    }
}
