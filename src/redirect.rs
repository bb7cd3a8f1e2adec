use crate::parser::{self, ParseError, ParseResult};
use crate::types::*;

use std::fs;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::PathBuf;

use log::{debug, warn};
use nix::fcntl;
use nix::unistd;
use thiserror::Error;

pub const INPUT: &str = "<";
pub const OUTPUT: &str = ">";

// Owner read/write/execute. Wider than needed; 0o600 would do.
const OUTPUT_MODE: u32 = 0o700;

#[derive(Debug, Error)]
pub enum RedirectError {
	#[error("{}: {source}", .path.display())]
	Open { path: PathBuf, source: io::Error },
	#[error("cannot rebind descriptor: {0}")]
	Dup(#[from] nix::Error),
}

/// Pulls every `<`/`>` pair out of `argv`. Remaining words keep their order.
pub fn extract_redirects(argv: Argv) -> ParseResult<(Argv, Vec<Redirect>)> {
	let mut words = Argv::with_capacity(argv.len());
	let mut redirects = vec![];
	let mut iter = argv.into_iter();
	while let Some(word) = iter.next() {
		let (typ, op) = if parser::is_op(&word, INPUT) {
			(RedirectType::Input, '<')
		} else if parser::is_op(&word, OUTPUT) {
			(RedirectType::Output, '>')
		} else {
			words.push(word);
			continue;
		};
		let target = iter.next().ok_or(ParseError::MissingRedirectTarget { op: op })?;
		redirects.push(Redirect { target: PathBuf::from(target), typ: typ });
	}
	Ok((words, redirects))
}

fn target_fd(typ: RedirectType) -> RawFd {
	match typ {
		RedirectType::Input => libc::STDIN_FILENO,
		RedirectType::Output => libc::STDOUT_FILENO,
	}
}

fn open(redirect: &Redirect) -> Result<fs::File, RedirectError> {
	let mut oopt = fs::OpenOptions::new();
	let _ = match redirect.typ {
		RedirectType::Input => oopt.read(true),
		RedirectType::Output => oopt.write(true).create(true).truncate(true).mode(OUTPUT_MODE),
	};
	oopt.open(&redirect.target).map_err(|e| RedirectError::Open { path: redirect.target.clone(), source: e })
}

/// Rebinds stdin/stdout of the calling process to the redirect targets, in
/// order. Callers in the interpreter process hold a [`StdioBackup`] first.
pub fn apply(redirects: &[Redirect]) -> Result<(), RedirectError> {
	for redirect in redirects {
		let fd = open(redirect)?.into_raw_fd();
		let to = target_fd(redirect.typ);
		let r = unistd::dup2(fd, to);
		let _ = unistd::close(fd);
		r?;
		debug!("redirected fd {} to {}", to, redirect.target.display());
	}
	Ok(())
}

/// Copies of the interpreter's stdin and stdout, put back on drop.
#[derive(Debug)]
pub struct StdioBackup {
	stdin: RawFd,
	stdout: RawFd,
}

// Close-on-exec, so a child forked while the backup is held never sees it.
fn dup_cloexec(fd: RawFd) -> nix::Result<RawFd> {
	fcntl::fcntl(fd, fcntl::FcntlArg::F_DUPFD_CLOEXEC(0))
}

impl StdioBackup {
	pub fn capture() -> Result<StdioBackup, RedirectError> {
		let stdin = dup_cloexec(libc::STDIN_FILENO)?;
		let stdout = match dup_cloexec(libc::STDOUT_FILENO) {
			Ok(fd) => fd,
			Err(e) => {
				let _ = unistd::close(stdin);
				return Err(e.into());
			},
		};
		Ok(StdioBackup { stdin: stdin, stdout: stdout })
	}
}

impl Drop for StdioBackup {
	fn drop(&mut self) {
		for &(saved, to) in &[(self.stdin, libc::STDIN_FILENO), (self.stdout, libc::STDOUT_FILENO)] {
			if let Err(e) = unistd::dup2(saved, to) {
				warn!("failed to restore fd {}: {}", to, e);
			}
			let _ = unistd::close(saved);
		}
	}
}
