use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Program name followed by its arguments, byte for byte as typed.
pub type Argv = Vec<OsString>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectType { Input, Output }

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Redirect {
	pub target: PathBuf,
	pub typ: RedirectType,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Command {
	pub argv: Argv,
	pub redirects: Vec<Redirect>,
}

impl Command {
	pub fn name(&self) -> &OsStr {
		&self.argv[0]
	}
}

/// One input line after classification.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Line {
	Empty,
	Exit,
	Recall { is_background: bool },
	Simple { command: Command, is_background: bool },
	/// Each side's redirects are applied inside its own child, after the
	/// pipe ends are wired.
	Piped { left: Command, right: Command, is_background: bool },
}

impl Line {
	/// Forces background execution on a runnable line; other lines are
	/// returned unchanged.
	pub fn with_background(self, background: bool) -> Line {
		match self {
			Line::Simple { command, is_background } =>
				Line::Simple { command: command, is_background: is_background || background },
			Line::Piped { left, right, is_background } =>
				Line::Piped { left: left, right: right, is_background: is_background || background },
			other => other,
		}
	}
}
