use llm::{
	samplers::llm_samplers::types::{HasSamplerResources, Logits, Sampler},
	Tokenizer,
};

use crate::{EffortBiasPolicy, EffortError, TokenId};

/// Returns the token ID for `text` if (and only if) it tokenizes to exactly one token
pub fn single_token_id_for(tokenizer: &Tokenizer, text: &str) -> Option<TokenId> {
	let tokens = tokenizer.tokenize(text, false).ok()?;
	match tokens.as_slice() {
		[(_, token_id)] => Some(*token_id),
		_ => None,
	}
}

/// Sampler that applies an [EffortBiasPolicy] to the raw logits. Push it to the front of a sampler chain, before any
/// sampler that rescales or filters the logits.
#[derive(Debug, Clone)]
pub struct SampleThinkingEffort {
	policy: EffortBiasPolicy,
}

impl SampleThinkingEffort {
	pub fn new(policy: EffortBiasPolicy) -> SampleThinkingEffort {
		SampleThinkingEffort { policy }
	}

	pub fn policy(&self) -> &EffortBiasPolicy {
		&self.policy
	}
}

impl Sampler for SampleThinkingEffort {
	fn sample<'a>(&mut self, res: &mut dyn HasSamplerResources<TokenId = TokenId>, logits: &'a mut Logits) -> anyhow::Result<&'a mut Logits> {
		let mut biased = Ok(false);
		res.with_last_tokens(&mut |tokens| biased = self.policy.observe(0, tokens))?;

		if biased? {
			// Earlier samplers in the chain may have reordered the logits, so look the marker up by ID
			let marker = self.policy.marker_token_id();
			let vocab_size = logits.len();
			let logit = logits
				.iter_mut()
				.find(|l| l.token_id == marker)
				.ok_or(EffortError::MarkerOutOfRange { marker, vocab_size })?;
			logit.logit *= self.policy.bias() as f32;
		}
		Ok(logits)
	}
}
