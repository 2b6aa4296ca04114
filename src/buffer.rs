// Copyright 2025 Cornell University
// released under MIT License

use rustc_hash::FxHashSet;

use crate::ir::{Action, Network, Op, Process};

/// Synthetic channel on which a buffer absorbs sends on `channel`.
pub fn inbound(channel: &str) -> String {
    format!("{channel}+")
}

/// Synthetic channel on which a buffer emits to receives on `channel`.
pub fn outbound(channel: &str) -> String {
    format!("{channel}-")
}

/// Builds the occupancy automaton for a bounded FIFO channel with
/// `capacity` cells. States are labelled `"0"..=capacity`.
pub fn buffer_process(net: &mut Network, channel: &str, capacity: u32) -> Process {
    let absorb = net.channel(&inbound(channel));
    let emit = net.channel(&outbound(channel));
    let mut proc = Process::new_buffer();
    for i in 0..=capacity {
        let here = proc.state(&i.to_string());
        if i > 0 {
            let below = proc.state(&(i - 1).to_string());
            proc.add_action(here, Action::new(emit, Op::Send, 0), below);
        }
        if i < capacity {
            let above = proc.state(&(i + 1).to_string());
            proc.add_action(here, Action::new(absorb, Op::Receive, 0), above);
        }
    }
    proc
}

/// Set of channels that were declared as buffered.
#[derive(Debug, Clone, Default)]
pub struct BufferedChannels {
    names: FxHashSet<String>,
}

impl BufferedChannels {
    pub fn insert(&mut self, channel: &str) -> bool {
        self.names.insert(channel.to_string())
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.names.contains(channel)
    }

    /// Name of the channel a user action on `channel` actually synchronizes on.
    /// The operation itself is never changed.
    pub fn rewrite(&self, channel: &str, op: Op) -> String {
        if !self.contains(channel) {
            return channel.to_string();
        }
        match op {
            Op::Send => inbound(channel),
            Op::Receive => outbound(channel),
        }
    }
}
