// Copyright 2025 Cornell University
// released under MIT License

use std::path::Path;

use log::{debug, info};
use pest::error::{InputLocation, LineColLocation};
use pest::Parser;
use pest_derive::Parser;
use rustc_hash::FxHashSet;

use crate::buffer::{buffer_process, BufferedChannels};
use crate::diagnostic::{DiagnosticHandler, Level};
use crate::errors::{LoadError, LoadResult, Span};
use crate::ir::{Action, Network, Op, Process};

#[derive(Parser)]
#[grammar = "cfsm.pest"]
struct CfsmParser;

/// A non-empty input line after comment stripping
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line<'a> {
    /// 1-based
    number: usize,
    span: Span,
    words: Vec<&'a str>,
}

fn tokenize(input: &str) -> LoadResult<Vec<Line<'_>>> {
    let mut pairs = CfsmParser::parse(Rule::file, input).map_err(|err| {
        let span = match err.location {
            InputLocation::Pos(start) => (start, start),
            InputLocation::Span(span) => span,
        };
        let line = match err.line_col {
            LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
        };
        LoadError::format(
            format!("Lexing failed: {}", err.variant.message()),
            line,
            span,
        )
    })?;

    let Some(file) = pairs.next() else {
        return Ok(Vec::new());
    };

    let mut lines = Vec::new();
    for pair in file.into_inner() {
        if pair.as_rule() != Rule::line {
            continue;
        }
        let (number, _) = pair.line_col();
        let span = (pair.as_span().start(), pair.as_span().end());
        let words: Vec<&str> = pair.into_inner().map(|w| w.as_str()).collect();
        if !words.is_empty() {
            lines.push(Line {
                number,
                span,
                words,
            });
        }
    }
    Ok(lines)
}

/// Splits `<channel><op>[@<priority>]` into its parts.
fn parse_action(word: &str) -> Result<(&str, Op, i32), String> {
    let (chan_op, priority) = match word.split_once('@') {
        Some((chan_op, pri)) => {
            let priority = pri
                .parse::<i32>()
                .map_err(|_| format!("Invalid priority '{pri}' in action '{word}'"))?;
            (chan_op, priority)
        }
        None => (word, 0),
    };
    let Some(op_char) = chan_op.chars().last() else {
        return Err(format!("Invalid action '{word}'"));
    };
    let channel = &chan_op[..chan_op.len() - op_char.len_utf8()];
    if channel.is_empty() {
        return Err(format!("Invalid action '{word}'"));
    }
    let op = Op::from_char(op_char)
        .ok_or_else(|| format!("Unrecognized operation char '{op_char}'"))?;
    Ok((channel, op, priority))
}

struct Loader<'a> {
    lines: std::vec::IntoIter<Line<'a>>,
    net: Network,
    buffered: BufferedChannels,
    /// channel names used by any action so far (after buffer rewriting)
    seen: FxHashSet<String>,
}

impl<'a> Loader<'a> {
    fn new(lines: Vec<Line<'a>>) -> Self {
        Self {
            lines: lines.into_iter(),
            net: Network::new(),
            buffered: BufferedChannels::default(),
            seen: FxHashSet::default(),
        }
    }

    fn load(mut self) -> LoadResult<Network> {
        while let Some(header) = self.lines.next() {
            self.parse_header(&header)?;
        }
        if self.net.is_empty() {
            return Err(LoadError::format("No processes declared", 1, (0, 0)));
        }
        Ok(self.net)
    }

    fn add_process(&mut self, name: String, proc: Process, header: &Line) -> LoadResult<()> {
        if self.net.contains_process(&name) {
            return Err(LoadError::duplicate(
                format!("Duplicate process name '{name}'"),
                header.number,
                header.span,
            ));
        }
        debug!("adding process {name} with {} states", proc.state_count());
        self.net.add_process(name, proc);
        Ok(())
    }

    fn parse_header(&mut self, header: &Line) -> LoadResult<()> {
        let (name, arg) = match header.words.as_slice() {
            &["."] => {
                return Err(LoadError::format(
                    "Unexpected '.' outside of a process block",
                    header.number,
                    header.span,
                ))
            }
            &[name] => (name, None),
            &[name, arg] => (name, Some(arg)),
            _ => {
                return Err(LoadError::format(
                    "Process header shall have format: <name> [<count> | %<capacity>]",
                    header.number,
                    header.span,
                ))
            }
        };

        if let Some(capacity) = arg.and_then(|a| a.strip_prefix('%')) {
            return self.parse_buffer(name, capacity, header);
        }

        let count = match arg {
            None => 1,
            Some(count) => count.parse::<i64>().map_err(|_| {
                LoadError::format(
                    format!("Invalid process count '{count}'"),
                    header.number,
                    header.span,
                )
            })?,
        };
        if count < 1 {
            return Err(LoadError::invalid_count(
                format!("Invalid process count {count}"),
                header.number,
                header.span,
            ));
        }

        let proc = self.parse_block(name, header)?;
        if count == 1 {
            self.add_process(name.to_string(), proc, header)?;
        } else {
            for i in 0..count {
                self.add_process(format!("{name}{i}"), proc.clone(), header)?;
            }
        }
        Ok(())
    }

    fn parse_buffer(&mut self, name: &str, capacity: &str, header: &Line) -> LoadResult<()> {
        let capacity = capacity.parse::<i64>().map_err(|_| {
            LoadError::format(
                format!("Invalid buffer capacity '{capacity}'"),
                header.number,
                header.span,
            )
        })?;
        let capacity = u32::try_from(capacity).map_err(|_| {
            LoadError::invalid_count(
                format!("Invalid buffer capacity {capacity}"),
                header.number,
                header.span,
            )
        })?;
        if self.buffered.contains(name) {
            return Err(LoadError::duplicate(
                format!("Duplicate buffer specification for channel '{name}'"),
                header.number,
                header.span,
            ));
        }
        if self.seen.contains(name) {
            return Err(LoadError::ordering(
                format!("Channel buffer specification must precede channel usage '{name}'"),
                header.number,
                header.span,
            ));
        }
        self.buffered.insert(name);
        self.seen.insert(name.to_string());
        let proc = buffer_process(&mut self.net, name, capacity);
        self.add_process(name.to_string(), proc, header)
    }

    /// Reads transition lines up to a `.` line or the end of input.
    fn parse_block(&mut self, name: &str, header: &Line) -> LoadResult<Process> {
        let mut proc = Process::new();
        let mut used = Vec::new();
        for line in self.lines.by_ref() {
            if line.words == ["."] {
                break;
            }
            let &[from, action, to] = line.words.as_slice() else {
                return Err(LoadError::format(
                    "Transition line shall have format: <from-state> <action> <to-state>",
                    line.number,
                    line.span,
                ));
            };
            let (channel, op, priority) = parse_action(action)
                .map_err(|msg| LoadError::format(msg, line.number, line.span))?;
            let channel = self.buffered.rewrite(channel, op);
            let action_id = Action::new(self.net.channel(&channel), op, priority);

            let (from_id, to_id) = (proc.state(from), proc.state(to));
            if !proc.add_action(from_id, action_id, to_id) {
                return Err(LoadError::duplicate(
                    format!("Duplicate action '{action}' at state '{from}'"),
                    line.number,
                    line.span,
                ));
            }
            used.push(channel);
        }
        if proc.initial().is_none() {
            return Err(LoadError::format(
                format!("Process '{name}' has no transitions"),
                header.number,
                header.span,
            ));
        }
        self.seen.extend(used);
        Ok(proc)
    }
}

/// Loads a network from its textual description.
pub fn load_network(input: &str) -> LoadResult<Network> {
    Loader::new(tokenize(input)?).load()
}

/// Loads `input` and reports any error through `handler` under `name`.
pub fn parse_source(
    name: String,
    input: String,
    handler: &mut DiagnosticHandler,
) -> LoadResult<Network> {
    let result = load_network(&input);
    if let Err(err) = &result {
        let fileid = handler.add_file(name, input);
        handler.emit_load_error(fileid, err);
    }
    result
}

pub fn parse_file(
    filename: impl AsRef<Path>,
    handler: &mut DiagnosticHandler,
) -> LoadResult<Network> {
    let path = filename.as_ref();
    let name = path.display().to_string();
    let input = match std::fs::read_to_string(path) {
        Ok(input) => input,
        Err(err) => {
            handler.emit_general_message(&format!("{name}: failed to load: {err}"), Level::Error);
            return Err(err.into());
        }
    };
    let net = parse_source(name, input, handler)?;
    info!("loaded {} with {} processes", path.display(), net.len());
    Ok(net)
}
