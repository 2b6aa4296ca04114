// Copyright 2025 Cornell University
// released under MIT License

use std::io::Write;

use clap::ColorChoice;
use codespan_reporting::diagnostic::{
    Diagnostic as CodespanDiagnostic, Label as CodespanLabel, LabelStyle, Severity,
};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{Buffer, Color, ColorSpec, WriteColor};

use crate::errors::{LoadError, Span};

/// Severity of diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
}

/// A label representing a part of the source code
#[derive(Debug, Clone, PartialEq, Eq)]
struct Label {
    message: Option<String>,
    range: Span,
}

impl Label {
    fn to_codespan_label(&self, fileid: usize) -> CodespanLabel<usize> {
        CodespanLabel::new(LabelStyle::Primary, fileid, self.range.0..self.range.1)
            .with_message(self.message.clone().unwrap_or_default())
    }
}

/// Diagnostic of a particular part of source code
struct Diagnostic {
    title: String,
    message: String,
    level: Level,
    location: Option<(usize, Label)>,
}

impl Diagnostic {
    fn emit(&self, buffer: &mut Buffer, files: &SimpleFiles<String, String>) {
        let color = match self.level {
            Level::Error => Color::Red,
            Level::Warning => Color::Yellow,
        };
        let in_file = |fileid: usize, label: &Label| {
            let (start, end) = label.range;
            files
                .get(fileid)
                .is_ok_and(|file| start <= end && end <= file.source().len())
        };
        if let Some((fileid, label)) = self.location.as_ref().filter(|(f, l)| in_file(*f, l)) {
            let severity = match self.level {
                Level::Error => Severity::Error,
                Level::Warning => Severity::Warning,
            };

            let diagnostic = CodespanDiagnostic::new(severity)
                .with_message(&self.message)
                .with_labels(vec![label.to_codespan_label(*fileid)]);

            let config = term::Config::default();
            if term::emit(buffer, &config, files, &diagnostic).is_ok() {
                return;
            }
            buffer.clear();
        }

        // no location, or the span lies outside of the file
        // writes into an in-memory buffer cannot fail
        let _ = buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(color)));
        let _ = write!(buffer, "{}", self.title);
        let _ = buffer.set_color(&ColorSpec::new());
        let _ = writeln!(buffer, ": {}", self.message);
    }
}

pub struct DiagnosticHandler {
    files: SimpleFiles<String, String>,
    error_string: String,
    /// `color_choice` indicates whether to emit error messages w/ ANSI colors
    color_choice: ColorChoice,
}

impl Default for DiagnosticHandler {
    /// Default `DiagnosticHandler` does not emit colored error messages
    fn default() -> Self {
        Self::new(ColorChoice::Never)
    }
}

impl DiagnosticHandler {
    pub fn new(color_choice: ColorChoice) -> Self {
        Self {
            files: SimpleFiles::new(),
            error_string: String::new(),
            color_choice,
        }
    }

    fn create_buffer(&self) -> Buffer {
        if self.color_choice == ColorChoice::Never {
            Buffer::no_color()
        } else {
            Buffer::ansi()
        }
    }

    pub fn add_file(&mut self, name: String, content: String) -> usize {
        self.files.add(name, content)
    }

    /// Everything emitted so far, as it was written to stderr
    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    fn flush(&mut self, buffer: Buffer) {
        let msg = String::from_utf8_lossy(buffer.as_slice());
        self.error_string.push_str(&msg);
        eprint!("{}", msg);
    }

    /// Emits `message` with a label on the byte range `span` of file `fileid`.
    pub fn emit_diagnostic_line(
        &mut self,
        message: &str,
        fileid: usize,
        span: Span,
        level: Level,
    ) {
        let mut buffer = self.create_buffer();
        let diagnostic = Diagnostic {
            title: format!("{:?} in file {}", level, fileid),
            message: message.to_string(),
            level,
            location: Some((
                fileid,
                Label {
                    message: Some(message.to_string()),
                    range: span,
                },
            )),
        };
        diagnostic.emit(&mut buffer, &self.files);
        self.flush(buffer);
    }

    pub fn emit_general_message(&mut self, message: &str, level: Level) {
        let mut buffer = self.create_buffer();
        let diagnostic = Diagnostic {
            title: format!("{:?}", level),
            message: message.to_string(),
            level,
            location: None,
        };
        diagnostic.emit(&mut buffer, &self.files);
        self.flush(buffer);
    }

    pub fn emit_load_error(&mut self, fileid: usize, error: &LoadError) {
        let message = match error.line() {
            Some(line) => format!("line {line}: {error}"),
            None => error.to_string(),
        };
        match error.span() {
            Some(span) => self.emit_diagnostic_line(&message, fileid, span, Level::Error),
            None => self.emit_general_message(&message, Level::Error),
        }
    }
}
