// Copyright 2025 Cornell University
// released under MIT License

pub mod buffer;
pub mod diagnostic;
pub mod errors;
pub mod explorer;
pub mod inputs;
pub mod ir;
pub mod parser;
pub mod trace;

pub use diagnostic::DiagnosticHandler;
pub use explorer::{explore, Explorer, Outcome};
pub use parser::{load_network, parse_file};
pub use trace::{summary, Layout};
