// Copyright 2025 Cornell University
// released under MIT License

use cranelift_entity::EntityRef;

use crate::explorer::{GlobalState, Move, Slot, Transition, Visited};
use crate::ir::{Network, ProcessId};

/// Suffix marking an in-flight state when printing
const IN_FLIGHT_MARK: char = '\'';

/// Recovers the path from the initial state to `end` by following the
/// discovering transitions backwards.
pub fn reconstruct(visited: &Visited, end: &GlobalState) -> Vec<Transition> {
    let mut trace = Vec::new();
    let mut cur = end.clone();
    loop {
        match visited.get(&cur) {
            Some(Some(transition)) => {
                cur = transition.undo(&cur);
                trace.push(*transition);
            }
            Some(None) => break,
            None => panic!("state {cur:?} is missing from the visited map"),
        }
    }
    trace.reverse();
    trace
}

/// Column widths for printing transitions of one network
pub struct Layout<'a> {
    net: &'a Network,
    name_width: usize,
    state_width: usize,
    channel_width: usize,
}

impl<'a> Layout<'a> {
    pub fn new(net: &'a Network) -> Self {
        let name_width = net.names().map(|n| n.chars().count()).max().unwrap_or(0);
        let mark = if net.has_priorities() { 1 } else { 0 };
        let state_width = net
            .processes()
            .flat_map(|(_, p)| p.sources().map(move |s| p.label(s)))
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0)
            + mark;
        // at least wide enough for the `-` of a finishing move
        let channel_width = net
            .channels()
            .iter()
            .map(|c| c.chars().count())
            .max()
            .unwrap_or(0)
            .max(1);
        Self {
            net,
            name_width,
            state_width,
            channel_width,
        }
    }

    pub fn slot(&self, process: ProcessId, slot: Slot) -> String {
        let label = self.net[process].label(slot.state());
        if slot.is_in_flight() {
            format!("{label}{IN_FLIGHT_MARK}")
        } else {
            label.to_string()
        }
    }

    /// `Name.state` for every process
    pub fn global_state(&self, state: &GlobalState) -> String {
        state
            .slots()
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let pid = ProcessId::new(i);
                format!("{}.{}", self.net.name(pid), self.slot(pid, *slot))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn half(&self, m: &Move, channel: &str, marker: char) -> String {
        format!(
            "{:>nw$}.({:<sw$} {:>cw$}{} {:<sw$})",
            self.net.name(m.process),
            self.slot(m.process, m.from),
            channel,
            marker,
            self.slot(m.process, m.to),
            nw = self.name_width,
            sw = self.state_width,
            cw = self.channel_width,
        )
    }

    pub fn transition(&self, transition: &Transition) -> String {
        match transition {
            Transition::Comm {
                channel,
                send,
                recv,
            } => {
                let channel = self.net.channel_name(*channel);
                format!(
                    "{}   {}",
                    self.half(send, channel, '!'),
                    self.half(recv, channel, '?')
                )
            }
            Transition::Move(m) => self.half(m, "-", '>'),
        }
    }

    /// One line per transition
    pub fn render(&self, trace: &[Transition]) -> String {
        trace
            .iter()
            .map(|t| self.transition(t))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Process and channel overview printed before the analysis
pub fn summary(net: &Network) -> String {
    format!("-- Processes: {net}\n--  Channels: {}", net.channels().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::{explore, Outcome};
    use crate::parser::{load_network, parse_file};
    use crate::DiagnosticHandler;
    use insta::Settings;
    use std::path::Path;

    fn snap(name: &str, content: String) {
        let mut settings = Settings::clone_current();
        settings.set_snapshot_path(Path::new("../tests/snapshots"));
        settings.bind(|| {
            insta::assert_snapshot!(name, content);
        });
    }

    /// Loads a fixture and renders the deadlock report the way the CLI does
    fn deadlock_report(filename: &str) -> String {
        let net = parse_file(filename, &mut DiagnosticHandler::default()).unwrap();
        let layout = Layout::new(&net);
        match explore(&net) {
            Outcome::Deadlock { state, trace, .. } => {
                let mut out = format!("Found deadlock at {}", layout.global_state(&state));
                if !trace.is_empty() {
                    out.push('\n');
                    out.push_str(&layout.render(&trace));
                }
                out
            }
            Outcome::DeadlockFree { states } => format!("Analyzed {states} states"),
        }
    }

    #[test]
    fn test_philosophers_summary() {
        let net = parse_file("tests/philosophers.cfsm", &mut DiagnosticHandler::default()).unwrap();
        snap("philosophers_summary", summary(&net));
    }

    #[test]
    fn test_buffered_summary_lists_synthetic_channels() {
        let net = parse_file("tests/pipeline.cfsm", &mut DiagnosticHandler::default()).unwrap();
        assert_eq!(
            summary(&net),
            "-- Processes: c[3] Producer[2] Consumer[2]\n--  Channels: c+ c-"
        );
    }

    #[test]
    fn test_priority_trace() {
        snap("priority", deadlock_report("tests/priority.cfsm"));
    }

    #[test]
    fn test_buffer_trace() {
        snap("buffer_no_consumer", deadlock_report("tests/buffer_no_consumer.cfsm"));
    }

    #[test]
    fn test_initial_deadlock_has_empty_trace() {
        assert_eq!(
            deadlock_report("tests/mismatch.cfsm"),
            "Found deadlock at P0.s0 P1.s0"
        );
    }

    #[test]
    fn test_three_senders_trace() {
        let report = deadlock_report("tests/three_senders.cfsm");
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "Found deadlock at S0.s1 S1.s1 S2.s1 R.r");
        assert_eq!(lines[1], "S0.(s0 c! s1)    R.(r  c? r )");
        assert_eq!(lines[2], "S1.(s0 c! s1)    R.(r  c? r )");
        assert_eq!(lines[3], "S2.(s0 c! s1)    R.(r  c? r )");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_state_width_ignores_target_only_labels() {
        let net = load_network("P\ns0 c! longstate\n.\nQ\ns0 c? s0\n.\n").unwrap();
        let Outcome::Deadlock { state, trace, .. } = explore(&net) else {
            panic!("expected deadlock");
        };
        let layout = Layout::new(&net);
        assert_eq!(layout.global_state(&state), "P.longstate Q.s0");
        assert_eq!(layout.render(&trace), "P.(s0 c! longstate)   Q.(s0 c? s0)");
    }

    #[test]
    fn test_layout_pads_move_lines() {
        let net = parse_file("tests/priority.cfsm", &mut DiagnosticHandler::default()).unwrap();
        let layout = Layout::new(&net);
        let p0 = net.process_id("P0").unwrap();
        let s1 = net[p0].state_id("s1").unwrap();
        let m = Move {
            process: p0,
            from: Slot::InFlight(s1),
            to: Slot::Settled(s1),
        };
        assert_eq!(layout.transition(&Transition::Move(m)), "P0.(s1' -> s1 )");
    }

    #[test]
    fn test_reconstruct_from_initial() {
        let net = parse_file("tests/self_loop.cfsm", &mut DiagnosticHandler::default()).unwrap();
        let initial = GlobalState::initial(&net);
        let mut visited = Visited::default();
        visited.insert(initial.clone(), None);
        assert!(reconstruct(&visited, &initial).is_empty());
    }

    #[test]
    #[should_panic(expected = "missing from the visited map")]
    fn test_reconstruct_unknown_state_panics() {
        let net = parse_file("tests/self_loop.cfsm", &mut DiagnosticHandler::default()).unwrap();
        reconstruct(&Visited::default(), &GlobalState::initial(&net));
    }
}
