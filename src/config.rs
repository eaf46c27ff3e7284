use clap::Parser;
use effort_backend::{config::BackendConfig, types::EffortMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
	/// Task to use when none is given on the command line
	pub default_task: Option<String>,

	#[serde(flatten)]
	pub backend_config: BackendConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("could not read config file {0}: {1}")]
	Read(PathBuf, std::io::Error),

	#[error("invalid config file: {0}")]
	Parse(#[from] toml::de::Error),
}

impl Config {
	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		let config_string = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
		Ok(toml::from_str(&config_string)?)
	}
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
	/// Where to load the config file from
	#[arg(long, short = 'm', default_value = "config.toml")]
	pub config_path: PathBuf,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
	/// Complete a single prompt, streaming the output to stdout
	Complete(CompleteArgs),

	/// Answer every problem in a problem set with and without thinking effort, writing one JSON line per problem
	Eval(EvalArgs),
}

#[derive(clap::Args, Debug)]
pub struct EffortArgs {
	/// Thinking effort (overrides the task's configured effort)
	#[arg(long, short, allow_negative_numbers = true)]
	pub effort: Option<f64>,

	/// Do not bias towards or away from ending reasoning
	#[arg(long, conflicts_with = "effort")]
	pub no_effort: bool,
}

impl EffortArgs {
	pub fn mode(&self) -> EffortMode {
		match (self.no_effort, self.effort) {
			(true, _) => EffortMode::Disabled,
			(false, Some(effort)) => EffortMode::Override(effort),
			(false, None) => EffortMode::Task,
		}
	}
}

#[derive(clap::Args, Debug)]
pub struct CompleteArgs {
	/// Task to run (defaults to `default_task` from the config file)
	#[arg(long, short)]
	pub task: Option<String>,

	#[command(flatten)]
	pub effort: EffortArgs,

	/// Read the prompt from this file
	#[arg(long, conflicts_with = "prompt")]
	pub prompt_file: Option<PathBuf>,

	/// The prompt
	pub prompt: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct EvalArgs {
	/// Task to run (defaults to `default_task` from the config file)
	#[arg(long, short)]
	pub task: Option<String>,

	/// Thinking effort for the biased run (overrides the task's configured effort)
	#[arg(long, short, allow_negative_numbers = true)]
	pub effort: Option<f64>,

	/// Problem set: a JSON array, or JSON lines, of objects with a problem and an answer
	#[arg(long, short)]
	pub dataset: PathBuf,

	/// Only evaluate the first N problems
	#[arg(long)]
	pub limit: Option<usize>,
}
