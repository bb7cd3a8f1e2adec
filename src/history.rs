use crate::parser;

use std::ffi::{OsStr, OsString};

use log::debug;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
	#[error("no commands in history")]
	Empty,
	#[error("cannot background twice: '{0}' already runs in the background")]
	DoubleBackground(String),
}

/// The single previous command line.
#[derive(Debug, Default)]
pub struct History {
	last: Option<OsString>,
}

impl History {
	pub fn new() -> History {
		History { last: None }
	}

	/// Keeps `line` unless it is blank or itself a recall (`!!`, `!! &`).
	pub fn record(&mut self, line: &OsStr) {
		match parser::tokenize(line).first() {
			None => {},
			Some(first) if parser::is_op(first, parser::RECALL) => {},
			Some(_) => {
				debug!("history: {:?}", line);
				self.last = Some(line.to_os_string());
			},
		}
	}

	pub fn last(&self) -> Option<&OsStr> {
		self.last.as_deref()
	}

	/// Returns the line to run again, or why it can't be.
	pub fn recall(&self, is_background: bool) -> Result<&OsStr, HistoryError> {
		let line = self.last().ok_or(HistoryError::Empty)?;
		if is_background && parser::tokenize(line).iter().any(|t| parser::is_op(t, parser::BACKGROUND)) {
			return Err(HistoryError::DoubleBackground(line.to_string_lossy().into_owned()));
		}
		Ok(line)
	}
}
