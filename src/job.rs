use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

pub trait WaitStatusExt {
	fn get_pid(self) -> Option<Pid>;
	fn is_terminated(self) -> bool;
}

impl WaitStatusExt for WaitStatus {
	fn get_pid(self) -> Option<Pid> {
		match self {
			WaitStatus::Exited(pid, ..) => Some(pid),
			WaitStatus::Signaled(pid, ..) => Some(pid),
			WaitStatus::Stopped(pid, ..) => Some(pid),
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceEvent(pid, ..) => Some(pid),
			#[cfg(any(target_os = "linux", target_os = "android"))]
			WaitStatus::PtraceSyscall(pid) => Some(pid),
			WaitStatus::Continued(pid) => Some(pid),
			WaitStatus::StillAlive => None,
		}
	}

	fn is_terminated(self) -> bool {
		match self {
			WaitStatus::Exited(..) | WaitStatus::Signaled(..) => true,
			_ => false,
		}
	}
}

/// Numbers background launches. Nothing is ever removed: it only counts.
#[derive(Debug, Default)]
pub struct JobCounter {
	last: u32,
}

impl JobCounter {
	pub fn new() -> JobCounter {
		JobCounter { last: 0 }
	}

	pub fn next(&mut self) -> u32 {
		self.last += 1;
		self.last
	}

	pub fn count(&self) -> u32 {
		self.last
	}
}

/// The children forked for one command line, in launch order.
#[derive(Debug)]
pub struct JobBuilder {
	pids: Vec<Pid>,
}

impl JobBuilder {
	pub fn new(size_hint: usize) -> JobBuilder {
		JobBuilder { pids: Vec::with_capacity(size_hint) }
	}

	pub fn push_fork(&mut self) -> nix::Result<unistd::ForkResult> {
		// The interpreter is single threaded, so the child may run arbitrary
		// code until it execs or exits.
		let r = unsafe { unistd::fork() }?;
		if let unistd::ForkResult::Parent { child } = r {
			debug!("forked pid {}", child);
			self.pids.push(child);
		}
		Ok(r)
	}

	pub fn last_pid(&self) -> Option<Pid> {
		self.pids.last().cloned()
	}

	/// Blocks until every child has terminated, in launch order. Exit
	/// statuses are logged and otherwise discarded.
	pub fn wait(self) -> nix::Result<()> {
		for pid in self.pids {
			loop {
				match wait::waitpid(pid, None) {
					Ok(status) if status.is_terminated() => {
						debug!("pid {} finished: {:?}", pid, status);
						break;
					},
					Ok(_) => continue,
					Err(Errno::EINTR) => continue,
					Err(e) => return Err(e),
				}
			}
		}
		Ok(())
	}
}

/// Collects any terminated children without blocking, returning how many
/// were reaped.
pub fn reap_finished() -> usize {
	let mut reaped = 0;
	loop {
		match wait::waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
			Ok(WaitStatus::StillAlive) => break,
			Ok(status) => {
				if let Some(pid) = status.get_pid() {
					debug!("reaped background pid {}: {:?}", pid, status);
				}
				if status.is_terminated() {
					reaped += 1;
				}
			},
			Err(Errno::EINTR) => continue,
			Err(Errno::ECHILD) => break,
			Err(e) => {
				warn!("waitpid failed while reaping: {}", e);
				break;
			},
		}
	}
	reaped
}
