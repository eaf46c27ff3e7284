use crate::{EffortBiasPolicy, EffortError, EffortParameters, LogitsProcessor, MarkerDetection, TokenId};

/// Batched processor for engines that hand over the full token history and a dense logits row for every sequence in
/// the batch at each step. The batch size is taken from the first step.
#[derive(Debug, Clone)]
pub struct ThinkingEffortProcessor {
	end_thinking_token_id: TokenId,
	parameters: EffortParameters,
	policy: Option<EffortBiasPolicy>,
}

impl ThinkingEffortProcessor {
	/// Processor that ends biasing a sequence once the marker appears anywhere in its history
	pub fn new(end_thinking_token_id: TokenId, thinking_effort: f64, scale_factor: f64) -> ThinkingEffortProcessor {
		Self::with_parameters(
			end_thinking_token_id,
			EffortParameters {
				thinking_effort,
				scale_factor,
				detection: MarkerDetection::AnyInHistory,
			},
		)
	}

	pub fn with_parameters(end_thinking_token_id: TokenId, parameters: EffortParameters) -> ThinkingEffortProcessor {
		ThinkingEffortProcessor {
			end_thinking_token_id,
			parameters,
			policy: None,
		}
	}

	/// The policy driving this processor, once the first step has been processed
	pub fn policy(&self) -> Option<&EffortBiasPolicy> {
		self.policy.as_ref()
	}
}

impl LogitsProcessor for ThinkingEffortProcessor {
	fn process(&mut self, input_ids: &[Vec<TokenId>], scores: &mut [Vec<f32>]) -> Result<(), EffortError> {
		let policy = self
			.policy
			.get_or_insert_with(|| EffortBiasPolicy::from_parameters(&self.parameters, self.end_thinking_token_id, input_ids.len()));
		policy.apply(input_ids, scores)
	}
}

/// Returns a step function for engines that decode a single sequence and call back with the tokens so far and the
/// logits for the next token.
pub fn thinking_effort_processor(
	thinking_effort: f64,
	end_thinking_token_id: TokenId,
	scale_factor: f64,
) -> impl FnMut(&[TokenId], &mut [f32]) -> Result<(), EffortError> {
	let mut policy = EffortBiasPolicy::new(thinking_effort, end_thinking_token_id, scale_factor, 1);
	move |input_ids: &[TokenId], logits: &mut [f32]| policy.step(input_ids, logits)
}
