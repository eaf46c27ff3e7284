use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use effort_backend::backend::Backend;
use effort_backend::session::{effort_parameters, InferenceFeedback, InferenceResponse};
use effort_backend::types::{EffortMode, GenerateError, PromptRequest};
use thinking_effort::config::{Args, Command, CompleteArgs, Config, ConfigError, EvalArgs};
use thinking_effort::eval::{load_problems, run_eval, EvalError, TaskSolver};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
enum CliError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Generate(#[from] GenerateError),

	#[error(transparent)]
	Eval(#[from] EvalError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("no task given and no default_task configured")]
	NoTask,

	#[error("no prompt given")]
	NoPrompt,
}

fn main() -> ExitCode {
	// Output goes to stdout, logs go to stderr
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.init();

	let args = Args::parse();
	match run(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!("{e}");
			ExitCode::FAILURE
		}
	}
}

fn run(args: Args) -> Result<(), CliError> {
	let config = Config::from_file(&args.config_path)?;
	info!("Starting thinking-effort; config: {:?}", args.config_path);
	let default_task = config.default_task.clone();
	let backend = Backend::from(config.backend_config)?;

	match args.command {
		Command::Complete(complete) => {
			let task = complete.task.clone().or(default_task).ok_or(CliError::NoTask)?;
			complete_command(&backend, &task, complete)
		}
		Command::Eval(eval) => {
			let task = eval.task.clone().or(default_task).ok_or(CliError::NoTask)?;
			eval_command(&backend, &task, eval)
		}
	}
}

fn complete_command(backend: &Backend, task: &str, args: CompleteArgs) -> Result<(), CliError> {
	let prompt = match (args.prompt, args.prompt_file) {
		(Some(prompt), _) => prompt,
		(None, Some(path)) => std::fs::read_to_string(path)?,
		(None, None) => return Err(CliError::NoPrompt),
	};

	let mut session = backend.start(task)?;
	let request = PromptRequest::new(prompt).with_effort(args.effort.mode());
	let mut stdout = std::io::stdout().lock();

	let completion = session.complete(&request, |r| {
		if let InferenceResponse::InferredToken(t) = r {
			// Do not continue when nobody is reading anymore
			if stdout.write_all(t.as_bytes()).and_then(|_| stdout.flush()).is_err() {
				tracing::debug!("stdout closed, halting generation");
				return Ok(InferenceFeedback::Halt);
			}
		}
		Ok(InferenceFeedback::Continue)
	})?;
	writeln!(stdout)?;

	match completion.reasoning_tokens {
		Some(n) => info!("reasoning ended after {n} of {} tokens", completion.tokens_generated),
		None => info!("reasoning did not end within {} tokens", completion.tokens_generated),
	}
	Ok(())
}

fn eval_command(backend: &Backend, task: &str, args: EvalArgs) -> Result<(), CliError> {
	let mut problems = load_problems(&args.dataset)?;
	if let Some(limit) = args.limit {
		problems.truncate(limit);
	}
	info!("Processing {} problems from {:?}", problems.len(), args.dataset);

	let effort = match args.effort {
		Some(effort) => EffortMode::Override(effort),
		None => EffortMode::Task,
	};
	let task_effort = backend.config.tasks.get(task).and_then(|t| t.effort.as_ref());
	let parameters = effort_parameters(task_effort, effort);
	if parameters.is_none() {
		tracing::warn!("task {task} has no thinking effort configured and none was given; both runs will be unbiased");
	}

	let solver = TaskSolver { backend, task };
	let mut stdout = std::io::stdout().lock();
	let summary = run_eval(&solver, &problems, effort, parameters.as_ref(), &mut stdout)?;

	info!("Evaluation complete: {}", serde_json::to_string(&summary).unwrap_or_default());
	if let Some(stats) = backend.task_stats(task) {
		info!("Task statistics: {stats:?}");
	}
	Ok(())
}
