use effort_bias::EffortError;
use llm::{InferenceError, InferenceStats, TokenizationError};
use serde::Serialize;
use thiserror::Error;

/// Which thinking effort to apply to a completion
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum EffortMode {
	/// Use the effort configured for the task (if any)
	#[default]
	Task,

	/// Use this thinking effort; the rest of the configuration is taken from the task
	Override(f64),

	/// Do not bias the completion
	Disabled,
}

#[derive(Clone, Debug)]
pub struct PromptRequest {
	pub prompt: String,
	pub effort: EffortMode,
}

impl PromptRequest {
	pub fn new(prompt: impl Into<String>) -> PromptRequest {
		PromptRequest {
			prompt: prompt.into(),
			effort: EffortMode::Task,
		}
	}

	pub fn with_effort(mut self, effort: EffortMode) -> PromptRequest {
		self.effort = effort;
		self
	}
}

/// Why generation stopped
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
	EndOfText,
	MaxTokens,
	ContextFull,
	Halted,
}

#[derive(Debug)]
pub struct Completion {
	/// The generated text (excluding the prompt)
	pub text: String,

	/// Number of tokens generated
	pub tokens_generated: usize,

	/// Number of generated tokens up to and including the end-of-reasoning marker, if it was generated
	pub reasoning_tokens: Option<usize>,

	pub stop_reason: StopReason,

	pub stats: InferenceStats,
}

#[derive(Error, Debug)]
pub enum GenerateError {
	#[error("task not found: {0}")]
	TaskNotFound(String),

	#[error("model not found: {0}")]
	ModelNotFound(String),

	#[error("could not load model {0}: {1}")]
	ModelLoad(String, String),

	#[error("invalid sampler configuration: {0}")]
	InvalidSampler(String),

	#[error("marker '{0}' is not a single token in the model's vocabulary")]
	UnknownMarker(String),

	// llm_base::InferenceError is not Send
	#[error("inference error: {0}")]
	InferenceError(String),

	#[error("tokenization error: {0}")]
	TokenizationError(#[from] TokenizationError),

	#[error("effort bias error: {0}")]
	Effort(#[from] EffortError),
}

impl From<InferenceError> for GenerateError {
	fn from(e: InferenceError) -> GenerateError {
		GenerateError::InferenceError(e.to_string())
	}
}
