pub use llm::TokenId;

pub mod policy;
pub mod processor;
pub mod sampler;

pub use policy::{EffortBiasPolicy, EffortError, EffortParameters, MarkerDetection};

/// Base of the bias exponent when none is configured
pub const DEFAULT_SCALE_FACTOR: f64 = 2.0;

/// Thinking effort at which the marker token is left alone
pub const NEUTRAL_EFFORT: f64 = 1.0;

/// Textual form of the end-of-reasoning marker used by most reasoning models
pub const DEFAULT_MARKER: &str = "</think>";

/// An object that adjusts next-token scores for a batch of sequences during inference
pub trait LogitsProcessor {
	/// Adjust `scores` (one row of logits per sequence) in place, given the tokens generated so far for each sequence
	fn process(&mut self, input_ids: &[Vec<TokenId>], scores: &mut [Vec<f32>]) -> Result<(), EffortError>;
}

/// A processor that does not touch the scores in any way
pub struct NullProcessor {}

impl LogitsProcessor for NullProcessor {
	fn process(&mut self, _input_ids: &[Vec<TokenId>], _scores: &mut [Vec<f32>]) -> Result<(), EffortError> {
		Ok(())
	}
}
