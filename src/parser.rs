use crate::redirect;
use crate::types::*;

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("missing file name after '{op}'")]
	MissingRedirectTarget { op: char },
	#[error("missing command name")]
	MissingCommand,
	#[error("missing command on one side of '|'")]
	EmptyPipelineSide,
	#[error("usage: !! [&]")]
	RecallArguments,
}

pub type ParseResult<T> = Result<T, ParseError>;

pub const BACKGROUND: &str = "&";
pub const PIPE: &str = "|";
pub const RECALL: &str = "!!";
pub const EXIT: &str = "exit";

struct Tokenizer<'a> {
	line: &'a [u8],
	i: usize,
}

impl<'a> Tokenizer<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	// Only the space character separates words; tabs are part of a word.
	fn is_separator(c: u8) -> bool {
		c == b' '
	}

	fn skip_separators(&mut self) {
		self.proceed_while(Tokenizer::is_separator);
	}

	fn read_word(&mut self) -> &'a [u8] {
		let orig = self.i;
		self.proceed_while(|c| !Tokenizer::is_separator(c));
		&self.line[orig .. self.i]
	}
}

/// Splits `line` on runs of spaces into owned tokens. The line itself is
/// left untouched so it can be kept for recall, and every byte of a word
/// reaches the program unchanged.
pub fn tokenize(line: &OsStr) -> Vec<OsString> {
	let mut tokenizer = Tokenizer { line: line.as_bytes(), i: 0 };
	let mut tokens = vec![];
	loop {
		tokenizer.skip_separators();
		let word = tokenizer.read_word();
		if word.is_empty() {
			break;
		}
		tokens.push(OsStr::from_bytes(word).to_os_string());
	}
	tokens
}

pub fn is_op(token: &OsStr, op: &str) -> bool {
	token == op
}

/// Cuts `argv` at the first `&`, dropping it and every word after it.
/// Returns whether one was found.
pub fn strip_background(argv: &mut Argv) -> bool {
	match argv.iter().position(|t| is_op(t, BACKGROUND)) {
		Some(i) => {
			argv.truncate(i);
			true
		},
		None => false,
	}
}

fn parse_command(argv: Argv) -> ParseResult<Command> {
	let (argv, redirects) = redirect::extract_redirects(argv)?;
	if argv.is_empty() {
		return Err(ParseError::MissingCommand);
	}
	Ok(Command { argv: argv, redirects: redirects })
}

/// Classifies an already tokenized line.
pub fn classify(mut tokens: Vec<OsString>) -> ParseResult<Line> {
	if tokens.is_empty() {
		return Ok(Line::Empty);
	}
	if tokens.len() == 1 && is_op(&tokens[0], EXIT) {
		return Ok(Line::Exit);
	}
	if is_op(&tokens[0], RECALL) {
		let rest = &tokens[1..];
		if rest.iter().any(|t| !is_op(t, BACKGROUND)) {
			return Err(ParseError::RecallArguments);
		}
		return Ok(Line::Recall { is_background: !rest.is_empty() });
	}

	let is_background = strip_background(&mut tokens);
	if tokens.is_empty() {
		return Ok(Line::Empty);
	}

	match tokens.iter().position(|t| is_op(t, PIPE)) {
		None => Ok(Line::Simple { command: parse_command(tokens)?, is_background: is_background }),
		Some(i) => {
			let right = tokens.split_off(i + 1);
			tokens.truncate(i);
			if tokens.is_empty() || right.is_empty() {
				return Err(ParseError::EmptyPipelineSide);
			}
			let left = parse_command(tokens)?;
			let right = parse_command(right)?;
			Ok(Line::Piped { left: left, right: right, is_background: is_background })
		},
	}
}

pub fn parse(line: &OsStr) -> ParseResult<Line> {
	classify(tokenize(line))
}
