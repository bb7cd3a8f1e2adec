use crate::global;
use crate::history::HistoryError;
use crate::job;
use crate::parser::{self, ParseError};
use crate::redirect::{self, RedirectError, StdioBackup};
use crate::types::*;

use std::convert::Infallible;
use std::ffi::{self, CString, OsStr};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, RawFd};

use log::debug;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd;
use thiserror::Error;

// Child exit statuses when the program never started.
const STATUS_NOT_FOUND: i32 = 127;
const STATUS_NOT_EXECUTABLE: i32 = 126;
const STATUS_REDIRECT_FAILED: i32 = 1;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error(transparent)]
	Parse(#[from] ParseError),
	#[error(transparent)]
	History(#[from] HistoryError),
	#[error(transparent)]
	Redirect(#[from] RedirectError),
	#[error("{name}: command not found")]
	NotFound { name: String },
	#[error("{name}: {source}")]
	Exec { name: String, source: nix::Error },
	#[error("fork failed: {0}")]
	Fork(nix::Error),
	#[error("pipe failed: {0}")]
	Pipe(nix::Error),
	#[error("wait failed: {0}")]
	Wait(nix::Error),
	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] ffi::NulError),
	#[error(transparent)]
	Io(#[from] io::Error),
}

/// What the read loop does after a line.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow { Continue, Exit }

fn do_exec_command(argv: &Argv) -> Result<Infallible, ExecError> {
	let args: Result<Vec<CString>, ffi::NulError> = argv.iter().map(|s| CString::new(s.as_bytes())).collect();
	let args = args?;
	// The interpreter ignores SIGPIPE; a pipeline writer must not.
	let _ = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) };
	let name = argv[0].to_string_lossy().into_owned();
	unistd::execvp(&args[0], &args).map_err(|e| match e {
		Errno::ENOENT => ExecError::NotFound { name: name },
		e => ExecError::Exec { name: name, source: e },
	})
}

/// Replaces the current (child) process image. Only returns by exiting.
fn exec_command(argv: &Argv) -> ! {
	let s = match do_exec_command(argv) {
		Ok(never) => match never {},
		Err(e) => {
			let _ = writeln!(&mut io::stderr(), "osh: {}", e);
			match e {
				ExecError::NotFound { .. } => STATUS_NOT_FOUND,
				_ => STATUS_NOT_EXECUTABLE,
			}
		},
	};
	unsafe { libc::_exit(s) }
}

fn pipe_child(command: &Command, end: RawFd, to: RawFd) -> ! {
	// The pipe itself is O_CLOEXEC; only the dup2 copy survives the exec.
	let r = unistd::dup2(end, to).map_err(RedirectError::from)
		.and_then(|_| redirect::apply(&command.redirects));
	if let Err(e) = r {
		let _ = writeln!(&mut io::stderr(), "osh: {}", e);
		unsafe { libc::_exit(STATUS_REDIRECT_FAILED) }
	}
	exec_command(&command.argv)
}

fn finish(state: &mut global::State, job: job::JobBuilder, is_background: bool) -> Result<(), ExecError> {
	if is_background {
		if let Some(pid) = job.last_pid() {
			let n = state.jobs.next();
			let mut stdout = io::stdout();
			writeln!(stdout, "[{}] {}", n, pid)?;
			stdout.flush()?;
		}
		Ok(())
	} else {
		job.wait().map_err(ExecError::Wait)
	}
}

/// Runs one command, redirecting the interpreter's own stdin/stdout
/// around the fork.
pub fn launch(state: &mut global::State, command: &Command, is_background: bool) -> Result<(), ExecError> {
	// Anything still buffered must reach the terminal, not the target file.
	io::stdout().flush()?;
	debug!("launching {:?} (background: {})", command.name(), is_background);
	let mut job = job::JobBuilder::new(1);
	{
		let _backup = StdioBackup::capture()?;
		redirect::apply(&command.redirects)?;
		match job.push_fork().map_err(ExecError::Fork)? {
			unistd::ForkResult::Parent { .. } => {},
			unistd::ForkResult::Child => exec_command(&command.argv),
		}
	}
	finish(state, job, is_background)
}

/// Runs `left | right`. Each side applies its own redirects after the
/// pipe is wired, so `a < in | b > out` works.
pub fn run_pipeline(state: &mut global::State, left: &Command, right: &Command, is_background: bool) -> Result<(), ExecError> {
	io::stdout().flush()?;
	let (pipe_read, pipe_write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(ExecError::Pipe)?;
	let mut job = job::JobBuilder::new(2);

	match job.push_fork().map_err(ExecError::Fork)? {
		unistd::ForkResult::Parent { .. } => {},
		unistd::ForkResult::Child => pipe_child(left, pipe_write.as_raw_fd(), libc::STDOUT_FILENO),
	}
	let r = job.push_fork();
	if let Ok(unistd::ForkResult::Child) = r {
		pipe_child(right, pipe_read.as_raw_fd(), libc::STDIN_FILENO);
	}
	// The reader sees end of input only once every write end is closed.
	drop(pipe_read);
	drop(pipe_write);

	if let Err(e) = r {
		// The left side is already running into a closed pipe.
		if !is_background {
			let _ = job.wait();
		}
		return Err(ExecError::Fork(e));
	}
	finish(state, job, is_background)
}

fn recall(state: &mut global::State, is_background: bool) -> Result<Flow, ExecError> {
	let line = state.history.recall(is_background)?.to_os_string();
	{
		let mut stdout = io::stdout();
		stdout.write_all(line.as_bytes())?;
		stdout.write_all(b"\n")?;
		stdout.flush()?;
	}
	let parsed = parser::parse(&line)?.with_background(is_background);
	debug!("recalled {:?} as {:?}", line, parsed);
	dispatch(state, parsed)
}

pub fn dispatch(state: &mut global::State, line: Line) -> Result<Flow, ExecError> {
	match line {
		Line::Empty => Ok(Flow::Continue),
		Line::Exit => Ok(Flow::Exit),
		Line::Recall { is_background } => recall(state, is_background),
		Line::Simple { command, is_background } => {
			launch(state, &command, is_background)?;
			Ok(Flow::Continue)
		},
		Line::Piped { left, right, is_background } => {
			run_pipeline(state, &left, &right, is_background)?;
			Ok(Flow::Continue)
		},
	}
}

/// Parses, records and runs one raw input line.
pub fn eval(state: &mut global::State, raw: &OsStr) -> Result<Flow, ExecError> {
	let line = parser::parse(raw)?;
	match line {
		Line::Simple { .. } | Line::Piped { .. } => state.history.record(raw),
		_ => {},
	}
	dispatch(state, line)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;

	fn state() -> global::State {
		global::State::new(Config::default())
	}

	#[test]
	fn blank_and_exit_lines_spawn_nothing() {
		let mut state = state();
		assert_eq!(eval(&mut state, OsStr::new("   ")).unwrap(), Flow::Continue);
		assert_eq!(eval(&mut state, OsStr::new("exit")).unwrap(), Flow::Exit);
		assert_eq!(state.history.last(), None);
		assert_eq!(state.jobs.count(), 0);
	}

	#[test]
	fn recall_with_empty_history() {
		let mut state = state();
		match eval(&mut state, OsStr::new("!!")) {
			Err(ExecError::History(HistoryError::Empty)) => {},
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(state.jobs.count(), 0);
	}

	#[test]
	fn parse_errors_are_not_recorded() {
		let mut state = state();
		match eval(&mut state, OsStr::new("echo hi >")) {
			Err(ExecError::Parse(ParseError::MissingRedirectTarget { op: '>' })) => {},
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(state.history.last(), None);
	}

	#[test]
	fn double_background_recall_spawns_nothing() {
		let mut state = state();
		state.history.record(OsStr::new("sleep 5 &"));
		match eval(&mut state, OsStr::new("!! &")) {
			Err(ExecError::History(HistoryError::DoubleBackground(_))) => {},
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(state.jobs.count(), 0);
	}

	#[test]
	fn error_messages() {
		assert_eq!(ExecError::NotFound { name: "nosuch".to_owned() }.to_string(), "nosuch: command not found");
		assert_eq!(ExecError::from(HistoryError::Empty).to_string(), "no commands in history");
		assert_eq!(ExecError::from(ParseError::EmptyPipelineSide).to_string(), "missing command on one side of '|'");
	}
}
