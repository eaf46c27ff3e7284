use std::{io::Write, path::Path};

use effort_backend::{
	backend::Backend,
	session::InferenceFeedback,
	types::{Completion, EffortMode, GenerateError, PromptRequest},
};
use effort_bias::EffortParameters;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
	#[error("could not read problem set: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid problem set: {0}")]
	Json(#[from] serde_json::Error),

	#[error("generation failed: {0}")]
	Generate(#[from] GenerateError),
}

fn answer_from_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	// Answers to competition problems are often stored as numbers
	Ok(match Value::deserialize(deserializer)? {
		Value::String(s) => s,
		other => other.to_string(),
	})
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Problem {
	#[serde(alias = "Problem")]
	pub problem: String,

	#[serde(alias = "Answer", deserialize_with = "answer_from_value")]
	pub answer: String,
}

/// Read a problem set, either as a JSON array or as JSON lines
pub fn load_problems(path: &Path) -> Result<Vec<Problem>, EvalError> {
	let text = std::fs::read_to_string(path)?;
	parse_problems(&text)
}

pub fn parse_problems(text: &str) -> Result<Vec<Problem>, EvalError> {
	if text.trim_start().starts_with('[') {
		return Ok(serde_json::from_str(text)?);
	}
	text.lines()
		.filter(|line| !line.trim().is_empty())
		.map(|line| serde_json::from_str(line).map_err(EvalError::from))
		.collect()
}

/// Something that answers a single problem
pub trait Solver {
	fn solve(&self, problem: &str, effort: EffortMode) -> Result<Completion, GenerateError>;
}

/// Solves each problem in a fresh session of a backend task
pub struct TaskSolver<'a> {
	pub backend: &'a Backend,
	pub task: &'a str,
}

impl Solver for TaskSolver<'_> {
	fn solve(&self, problem: &str, effort: EffortMode) -> Result<Completion, GenerateError> {
		let mut session = self.backend.start(self.task)?;
		session.complete(&PromptRequest::new(problem).with_effort(effort), |_| Ok(InferenceFeedback::Continue))
	}
}

#[derive(Serialize, Debug, Clone)]
pub struct EvalRecord {
	pub problem: String,
	pub response_with_thinking: String,
	pub response_without_thinking: String,
	pub gold_answer: String,
	pub thinking_effort: Option<f64>,
	pub scale_factor: Option<f64>,
	pub reasoning_tokens_with_thinking: Option<usize>,
	pub reasoning_tokens_without_thinking: Option<usize>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct EvalSummary {
	pub problems: usize,

	/// Runs that produced the end-of-reasoning marker
	pub finished_reasoning_with_thinking: usize,
	pub finished_reasoning_without_thinking: usize,

	/// Mean reasoning tokens over the runs that produced the marker
	pub mean_reasoning_tokens_with_thinking: Option<f64>,
	pub mean_reasoning_tokens_without_thinking: Option<f64>,
}

fn mean(values: &[usize]) -> Option<f64> {
	if values.is_empty() {
		None
	} else {
		Some(values.iter().sum::<usize>() as f64 / values.len() as f64)
	}
}

/// Answer each problem twice, with `effort` and with effort disabled, and write a JSON line per problem to `out` as
/// soon as it is done
pub fn run_eval(
	solver: &impl Solver,
	problems: &[Problem],
	effort: EffortMode,
	parameters: Option<&EffortParameters>,
	out: &mut impl Write,
) -> Result<EvalSummary, EvalError> {
	let mut with_thinking = vec![];
	let mut without_thinking = vec![];

	for (index, problem) in problems.iter().enumerate() {
		tracing::info!("processing problem {}/{}", index + 1, problems.len());

		tracing::debug!("running with thinking effort");
		let biased = solver.solve(&problem.problem, effort)?;

		tracing::debug!("running without thinking effort");
		let unbiased = solver.solve(&problem.problem, EffortMode::Disabled)?;

		with_thinking.extend(biased.reasoning_tokens);
		without_thinking.extend(unbiased.reasoning_tokens);

		let record = EvalRecord {
			problem: problem.problem.clone(),
			response_with_thinking: biased.text,
			response_without_thinking: unbiased.text,
			gold_answer: problem.answer.clone(),
			thinking_effort: parameters.map(|p| p.thinking_effort),
			scale_factor: parameters.map(|p| p.scale_factor),
			reasoning_tokens_with_thinking: biased.reasoning_tokens,
			reasoning_tokens_without_thinking: unbiased.reasoning_tokens,
		};
		serde_json::to_writer(&mut *out, &record)?;
		writeln!(out)?;
		out.flush()?;
	}

	Ok(EvalSummary {
		problems: problems.len(),
		finished_reasoning_with_thinking: with_thinking.len(),
		finished_reasoning_without_thinking: without_thinking.len(),
		mean_reasoning_tokens_with_thinking: mean(&with_thinking),
		mean_reasoning_tokens_without_thinking: mean(&without_thinking),
	})
}
