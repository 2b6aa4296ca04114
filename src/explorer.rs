// Copyright 2025 Cornell University
// released under MIT License

use std::collections::hash_map::Entry;
use std::collections::VecDeque;
use std::ops::Index;

use cranelift_entity::{EntityRef, SecondaryMap};
use log::{debug, info, trace};
use rustc_hash::FxHashMap;

use crate::ir::{ChannelId, Network, Op, ProcessId, StateId};
use crate::trace::reconstruct;

/// Log a progress line every this many expanded states
const PROGRESS_INTERVAL: usize = 100_000;

/// Current local state of one process.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Slot {
    Settled(StateId),
    /// Reached through a prioritized synchronization that has not been
    /// finished yet. The only enabled step is the finishing move.
    InFlight(StateId),
}

impl Slot {
    pub fn state(self) -> StateId {
        match self {
            Slot::Settled(s) | Slot::InFlight(s) => s,
        }
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, Slot::InFlight(_))
    }
}

/// One slot per process, indexed by `ProcessId`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct GlobalState(Box<[Slot]>);

impl GlobalState {
    /// Every process at its first declared state.
    pub fn initial(net: &Network) -> Self {
        let slots = net
            .processes()
            .map(|(_, proc)| {
                Slot::Settled(proc.initial().expect("processes have at least one state"))
            })
            .collect();
        GlobalState(slots)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this state with every move applied forwards.
    pub fn after(&self, moves: &[Move]) -> Self {
        let mut slots = self.0.clone();
        for m in moves {
            debug_assert_eq!(slots[m.process.index()], m.from);
            slots[m.process.index()] = m.to;
        }
        GlobalState(slots)
    }

    /// Copy of this state with every move undone.
    pub fn before(&self, moves: &[Move]) -> Self {
        let mut slots = self.0.clone();
        for m in moves {
            assert_eq!(
                slots[m.process.index()],
                m.to,
                "move of {} does not end in this state",
                m.process
            );
            slots[m.process.index()] = m.from;
        }
        GlobalState(slots)
    }
}

impl Index<ProcessId> for GlobalState {
    type Output = Slot;

    fn index(&self, index: ProcessId) -> &Self::Output {
        &self.0[index.index()]
    }
}

/// Step of a single process
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Move {
    pub process: ProcessId,
    pub from: Slot,
    pub to: Slot,
}

/// Edge of the search graph
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Transition {
    /// Joint synchronization of a sender and a receiver
    Comm {
        channel: ChannelId,
        send: Move,
        recv: Move,
    },
    /// Finishing step of an in-flight process
    Move(Move),
}

impl Transition {
    pub fn apply(&self, state: &GlobalState) -> GlobalState {
        match self {
            Transition::Comm { send, recv, .. } => state.after(&[*send, *recv]),
            Transition::Move(m) => state.after(&[*m]),
        }
    }

    pub fn undo(&self, state: &GlobalState) -> GlobalState {
        match self {
            Transition::Comm { send, recv, .. } => state.before(&[*send, *recv]),
            Transition::Move(m) => state.before(&[*m]),
        }
    }
}

/// Maps each discovered state to the transition that first reached it
/// (`None` for the initial state).
pub type Visited = FxHashMap<GlobalState, Option<Transition>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The whole reachable state space was explored without finding a deadlock.
    DeadlockFree { states: usize },
    /// `state` has no enabled transition, `trace` leads to it from the
    /// initial state.
    Deadlock {
        state: GlobalState,
        trace: Vec<Transition>,
        states: usize,
    },
}

impl Outcome {
    /// Number of distinct states discovered
    pub fn states(&self) -> usize {
        match self {
            Outcome::DeadlockFree { states } | Outcome::Deadlock { states, .. } => *states,
        }
    }

    pub fn is_deadlock_free(&self) -> bool {
        matches!(self, Outcome::DeadlockFree { .. })
    }
}

/// Enabled action of one process in the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    process: ProcessId,
    from: StateId,
    to: StateId,
    priority: i32,
}

#[derive(Debug, Clone, Default)]
struct ChannelCandidates {
    senders: Vec<Candidate>,
    receivers: Vec<Candidate>,
}

impl ChannelCandidates {
    fn is_empty(&self) -> bool {
        self.senders.is_empty() && self.receivers.is_empty()
    }

    fn clear(&mut self) {
        self.senders.clear();
        self.receivers.clear();
    }

    fn has_partner(&self, op: Op, process: ProcessId) -> bool {
        let partners = match op {
            Op::Send => &self.receivers,
            Op::Receive => &self.senders,
        };
        partners.iter().any(|c| c.process != process)
    }
}

/// Scratch data of a single expansion. Reset at the start of every round.
#[derive(Debug, Default)]
struct Round {
    candidates: SecondaryMap<ChannelId, ChannelCandidates>,
    /// channels with candidates this round, in first-touch order
    touched: Vec<ChannelId>,
    /// most urgent satisfiable priority per process
    min_priority: Vec<Option<i32>>,
}

impl Round {
    fn reset(&mut self, processes: usize) {
        for channel in self.touched.drain(..) {
            self.candidates[channel].clear();
        }
        self.min_priority.clear();
        self.min_priority.resize(processes, None);
    }

    fn push(&mut self, channel: ChannelId, op: Op, candidate: Candidate) {
        let entry = &mut self.candidates[channel];
        if entry.is_empty() {
            self.touched.push(channel);
        }
        match op {
            Op::Send => entry.senders.push(candidate),
            Op::Receive => entry.receivers.push(candidate),
        }
    }

    fn eligible(&self, candidate: &Candidate, has_priorities: bool) -> bool {
        !has_priorities || self.min_priority[candidate.process.index()] == Some(candidate.priority)
    }
}

#[derive(Debug, Default)]
struct Frontier {
    visited: Visited,
    queue: VecDeque<GlobalState>,
}

impl Frontier {
    fn clear(&mut self) {
        self.visited.clear();
        self.queue.clear();
    }

    /// First discovery wins.
    fn enqueue(&mut self, next: GlobalState, transition: Transition) {
        if let Entry::Vacant(entry) = self.visited.entry(next) {
            trace!("discovered via {:?}", transition);
            self.queue.push_back(entry.key().clone());
            entry.insert(Some(transition));
        }
    }
}

/// Breadth-first search over the global states of one network.
pub struct Explorer<'a> {
    net: &'a Network,
    has_priorities: bool,
    frontier: Frontier,
    round: Round,
    expanded: usize,
}

impl<'a> Explorer<'a> {
    pub fn new(net: &'a Network) -> Self {
        Self {
            net,
            has_priorities: net.has_priorities(),
            frontier: Frontier::default(),
            round: Round::default(),
            expanded: 0,
        }
    }

    /// Explores from the initial state until the state space is exhausted or
    /// the first deadlock is dequeued. Each call starts from scratch.
    pub fn run(&mut self) -> Outcome {
        self.frontier.clear();
        self.expanded = 0;

        let initial = GlobalState::initial(self.net);
        info!(
            "exploring {} processes (priorities {})",
            self.net.len(),
            if self.has_priorities { "on" } else { "off" }
        );
        self.frontier.visited.insert(initial.clone(), None);
        self.frontier.queue.push_back(initial);

        while let Some(cur) = self.frontier.queue.pop_front() {
            self.expanded += 1;
            if self.expanded % PROGRESS_INTERVAL == 0 {
                debug!(
                    "expanded {} states, {} discovered, {} queued",
                    self.expanded,
                    self.frontier.visited.len(),
                    self.frontier.queue.len()
                );
            }
            if !self.expand(&cur) {
                let trace = reconstruct(&self.frontier.visited, &cur);
                info!(
                    "deadlock after {} transitions, {} states discovered",
                    trace.len(),
                    self.frontier.visited.len()
                );
                return Outcome::Deadlock {
                    state: cur,
                    trace,
                    states: self.frontier.visited.len(),
                };
            }
        }

        info!("no deadlock in {} states", self.frontier.visited.len());
        Outcome::DeadlockFree {
            states: self.frontier.visited.len(),
        }
    }

    /// Number of states dequeued by the last `run`
    pub fn expanded(&self) -> usize {
        self.expanded
    }

    /// Predecessor map of the last `run`
    pub fn visited(&self) -> &Visited {
        &self.frontier.visited
    }

    /// Enqueues every successor of `cur`. Returns `false` if there is none.
    fn expand(&mut self, cur: &GlobalState) -> bool {
        debug_assert_eq!(cur.len(), self.net.len());
        self.round.reset(self.net.len());
        self.collect_candidates(cur);
        if self.has_priorities {
            self.resolve_priorities(cur);
        }

        let mut active = false;
        for &channel in &self.round.touched {
            let cands = &self.round.candidates[channel];
            for snd in &cands.senders {
                for rcv in &cands.receivers {
                    if snd.process == rcv.process
                        || !self.round.eligible(snd, self.has_priorities)
                        || !self.round.eligible(rcv, self.has_priorities)
                    {
                        continue;
                    }
                    let send = begin_move(self.net, self.has_priorities, snd);
                    let recv = begin_move(self.net, self.has_priorities, rcv);
                    let next = cur.after(&[send, recv]);
                    self.frontier
                        .enqueue(next, Transition::Comm { channel, send, recv });
                    active = true;
                }
            }
        }

        if self.has_priorities {
            for (index, slot) in cur.slots().iter().enumerate() {
                if let Slot::InFlight(state) = *slot {
                    let m = Move {
                        process: ProcessId::new(index),
                        from: *slot,
                        to: Slot::Settled(state),
                    };
                    self.frontier.enqueue(cur.after(&[m]), Transition::Move(m));
                    active = true;
                }
            }
        }

        active
    }

    fn collect_candidates(&mut self, cur: &GlobalState) {
        for (pid, proc) in self.net.processes() {
            // in-flight processes only offer their finishing move
            let Slot::Settled(from) = cur[pid] else {
                continue;
            };
            for (action, to) in proc.transitions(from) {
                self.round.push(
                    action.channel,
                    action.op,
                    Candidate {
                        process: pid,
                        from,
                        to: *to,
                        priority: action.priority,
                    },
                );
            }
        }
    }

    /// Each process commits to its most urgent action that has a partner.
    fn resolve_priorities(&mut self, cur: &GlobalState) {
        for (pid, proc) in self.net.processes() {
            let Slot::Settled(from) = cur[pid] else {
                continue;
            };
            let mut best: Option<i32> = None;
            for (action, _) in proc.transitions(from) {
                if self.round.candidates[action.channel].has_partner(action.op, pid) {
                    best = Some(best.map_or(action.priority, |b| b.min(action.priority)));
                }
            }
            self.round.min_priority[pid.index()] = best;
        }
    }
}

/// Buffers always move atomically; other processes go in flight when
/// priorities are active.
fn begin_move(net: &Network, has_priorities: bool, c: &Candidate) -> Move {
    let to = if has_priorities && !net[c.process].is_buffer() {
        Slot::InFlight(c.to)
    } else {
        Slot::Settled(c.to)
    };
    Move {
        process: c.process,
        from: Slot::Settled(c.from),
        to,
    }
}

/// Runs a fresh explorer on `net`.
pub fn explore(net: &Network) -> Outcome {
    Explorer::new(net).run()
}
