use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;
use io::BufRead;
use io::Read;
use io::Write;

use anyhow::Context;
use argh::FromArgs;
use log::{debug, LevelFilter};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode, WriteLogger};

use osh::{job, Config, Flow, State};

/// A small interactive shell.
#[derive(FromArgs)]
struct Args {
	/// configuration file (default: ~/.config/osh/config.toml)
	#[argh(option)]
	config: Option<PathBuf>,
	/// log level: off, error, warn, info, debug or trace
	#[argh(option)]
	log_level: Option<LevelFilter>,
	/// prompt printed before each line
	#[argh(option)]
	prompt: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
	Line(OsString),
	TooLong,
	Eof,
}

/// Consumes input up to and including the next newline.
fn skip_line<R: BufRead>(input: &mut R) -> io::Result<()> {
	loop {
		let (used, done) = {
			let buf = input.fill_buf()?;
			match buf.iter().position(|&c| c == b'\n') {
				Some(i) => (i + 1, true),
				None => (buf.len(), buf.is_empty()),
			}
		};
		input.consume(used);
		if done {
			return Ok(());
		}
	}
}

/// Reads one line, newline stripped, bytes kept as they are. At most
/// `max_content + 1` bytes are buffered; a longer line is drained and
/// rejected.
fn read_line<R: BufRead>(input: &mut R, max_content: usize) -> io::Result<Input> {
	let mut line: Vec<u8> = vec![];
	if input.by_ref().take(max_content as u64 + 1).read_until(b'\n', &mut line)? == 0 {
		return Ok(Input::Eof);
	}
	let complete = line.last() == Some(&b'\n');
	if complete {
		line.pop();
	}
	if line.len() > max_content {
		if !complete {
			skip_line(input)?;
		}
		return Ok(Input::TooLong);
	}
	Ok(Input::Line(OsString::from_vec(line)))
}

fn init_logging(config: &Config, level: LevelFilter) -> anyhow::Result<()> {
	let log_config = ConfigBuilder::new().set_time_level(LevelFilter::Off).build();
	match config.log_file {
		Some(ref path) => {
			let file = File::create(path).with_context(|| format!("cannot open log file {}", path.display()))?;
			WriteLogger::init(level, log_config, file)?;
		},
		None => TermLogger::init(level, log_config, TerminalMode::Stderr, ColorChoice::Never)?,
	}
	Ok(())
}

fn repl<R: BufRead>(state: &mut State, input: &mut R) -> io::Result<()> {
	let mut stdout = io::stdout();
	loop {
		if state.config.reap_background {
			job::reap_finished();
		}
		stdout.write_all(state.config.prompt.as_bytes())?;
		stdout.flush()?;

		let line = match read_line(input, state.config.max_content_len())? {
			Input::Eof => break,
			Input::TooLong => {
				eprintln!("osh: input line too long (max {} bytes)", state.config.max_content_len());
				continue;
			},
			Input::Line(line) => line,
		};
		match osh::eval(state, &line) {
			Ok(Flow::Continue) => {},
			Ok(Flow::Exit) => break,
			Err(e) => {
				debug!("{:?}", e);
				eprintln!("osh: {}", e);
			},
		}
	}
	Ok(())
}

fn main() -> anyhow::Result<()> {
	let args: Args = argh::from_env();
	let mut config = Config::load(args.config.as_deref()).context("cannot load configuration")?;
	if let Some(prompt) = args.prompt {
		config.prompt = prompt;
	}
	let level = match args.log_level {
		Some(level) => level,
		None => config.level_filter()?,
	};
	init_logging(&config, level)?;
	debug!("starting with {:?}", config);

	let mut state = State::new(config);
	let stdin = io::stdin();
	let mut stdin_locked = stdin.lock();
	repl(&mut state, &mut stdin_locked)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_lines_without_newline() {
		let mut input = io::Cursor::new(&b"ls -l\necho hi"[..]);
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::Line("ls -l".into()));
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::Line("echo hi".into()));
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::Eof);
	}

	#[test]
	fn long_lines_are_rejected_whole() {
		let mut input = io::Cursor::new(&b"abcdef\nabc\n"[..]);
		assert_eq!(read_line(&mut input, 3).unwrap(), Input::TooLong);
		assert_eq!(read_line(&mut input, 3).unwrap(), Input::Line("abc".into()));
	}

	#[test]
	fn line_at_the_limit_is_accepted() {
		let mut input = io::Cursor::new(&b"abc\nabcd"[..]);
		assert_eq!(read_line(&mut input, 3).unwrap(), Input::Line("abc".into()));
		assert_eq!(read_line(&mut input, 3).unwrap(), Input::TooLong);
		assert_eq!(read_line(&mut input, 3).unwrap(), Input::Eof);
	}

	#[test]
	fn huge_line_is_drained_in_pieces() {
		let mut data = vec![b'x'; 10_000];
		data.extend_from_slice(b"\nok\n");
		// A small buffer forces several refills while draining.
		let mut input = io::BufReader::with_capacity(16, &data[..]);
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::TooLong);
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::Line("ok".into()));
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::Eof);
	}

	#[test]
	fn bytes_are_kept_verbatim() {
		let mut input = io::Cursor::new(&b"touch caf\xe9\n"[..]);
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::Line(OsString::from_vec(b"touch caf\xe9".to_vec())));
	}

	#[test]
	fn empty_line_is_not_eof() {
		let mut input = io::Cursor::new(&b"\n"[..]);
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::Line(OsString::new()));
		assert_eq!(read_line(&mut input, 79).unwrap(), Input::Eof);
	}
}
