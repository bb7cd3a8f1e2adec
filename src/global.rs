use crate::config::Config;
use crate::history::History;
use crate::job::JobCounter;

/// Everything that outlives a single command line.
#[derive(Debug)]
pub struct State {
	pub history: History,
	pub jobs: JobCounter,
	pub config: Config,
}

impl State {
	pub fn new(config: Config) -> State {
		State { history: History::new(), jobs: JobCounter::new(), config: config }
	}
}
