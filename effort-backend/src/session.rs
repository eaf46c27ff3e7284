use std::{
	fmt::Debug,
	str::FromStr,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use effort_bias::{sampler::single_token_id_for, sampler::SampleThinkingEffort, EffortBiasPolicy, EffortParameters};
use llm::{
	samplers::{llm_samplers::types::SamplerChain, ConfiguredSamplers},
	InferenceError, InferenceParameters, InferenceStats, OutputRequest, Prompt, TokenId, TokenUtf8Buffer,
};
use rand::{rngs::StdRng, SeedableRng};

pub use llm::{InferenceFeedback, InferenceResponse};

use crate::{
	config::{EffortConfig, TaskConfig},
	stats::{BackendStats, InferenceStatsAdd},
	types::{Completion, EffortMode, GenerateError, PromptRequest, StopReason},
};

pub struct BackendSession {
	pub(crate) model: Arc<Box<dyn llm::Model>>,
	pub(crate) session: llm::InferenceSession,
	pub(crate) task_config: TaskConfig,
	pub(crate) stats: Arc<BackendStats>,
	pub(crate) task_name: String,
	pub(crate) n_threads: usize,
}

impl Debug for BackendSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BackendSession")
			.field("task_config", &self.task_config)
			.field("task_name", &self.task_name)
			.finish()
	}
}

/// Effort parameters that apply to a request, given the task's configuration
pub fn effort_parameters(task_effort: Option<&EffortConfig>, mode: EffortMode) -> Option<EffortParameters> {
	match mode {
		EffortMode::Task => task_effort.map(|c| c.parameters.clone()),
		EffortMode::Override(thinking_effort) => Some(EffortParameters {
			thinking_effort,
			..task_effort.map(|c| c.parameters.clone()).unwrap_or_default()
		}),
		EffortMode::Disabled => None,
	}
}

impl BackendSession {
	/// Resolve the end-of-reasoning marker for this session's model
	fn marker_token_id(&self, effort_config: &EffortConfig) -> Result<TokenId, GenerateError> {
		match effort_config.marker_token_id {
			Some(token_id) => Ok(token_id),
			None => single_token_id_for(self.model.tokenizer(), &effort_config.marker)
				.ok_or_else(|| GenerateError::UnknownMarker(effort_config.marker.clone())),
		}
	}

	/// Perform a completion task following the task's configuration.
	pub fn complete(
		&mut self,
		request: &PromptRequest,
		callback: impl FnMut(InferenceResponse) -> Result<InferenceFeedback, GenerateError>,
	) -> Result<Completion, GenerateError> {
		let completion = self.complete_actual(request, callback)?;
		let stats = &completion.stats;
		let prompt_tokens_per_s = (stats.prompt_tokens as f64) / stats.feed_prompt_duration.as_secs_f64();
		let predict_tokens_per_s = (stats.predict_tokens as f64) / stats.predict_duration.as_secs_f64();

		tracing::info!(
			reasoning_tokens = completion.reasoning_tokens,
			stop_reason = ?completion.stop_reason,
			"completion finished; {prompt_tokens_per_s:.3} t/s prompt, {predict_tokens_per_s:.3} t/s predict; stats: {:?}",
			stats
		);
		self.stats.add(&self.task_name, &completion, self.n_threads);
		Ok(completion)
	}

	fn complete_actual(
		&mut self,
		request: &PromptRequest,
		mut callback: impl FnMut(InferenceResponse) -> Result<InferenceFeedback, GenerateError>,
	) -> Result<Completion, GenerateError> {
		let mut completion_stats = InferenceStats::default();

		// Generate tokens (prefix + prompt + postfix)
		let beginning_of_sentence = self.model.bot_token_id().is_some() && self.session.n_past == 0;
		let mut tokens = vec![];

		if let Some(ref prefix) = self.task_config.prefix {
			tokens.append(&mut Prompt::Text(prefix).to_tokens(self.model.tokenizer(), beginning_of_sentence)?);
		}

		tokens.append(&mut Prompt::Text(&request.prompt).to_tokens(self.model.tokenizer(), beginning_of_sentence && tokens.is_empty())?);

		if let Some(ref postfix) = self.task_config.postfix {
			tokens.append(&mut Prompt::Text(postfix).to_tokens(self.model.tokenizer(), false)?);
		}

		tracing::trace!("prompt tokens: {tokens:?}");

		// Feed initial prompt
		let start = Instant::now();
		self.session.feed_prompt(
			self.model.as_ref().as_ref(),
			Prompt::Tokens(&tokens),
			&mut OutputRequest::default(),
			|_| -> Result<InferenceFeedback, GenerateError> { Ok(InferenceFeedback::Continue) },
		)?;
		completion_stats.add(&InferenceStats {
			feed_prompt_duration: Instant::now().duration_since(start),
			prompt_tokens: tokens.len(),
			predict_duration: Duration::ZERO,
			predict_tokens: 0,
		});

		// The marker is needed to bias, but is also used to count reasoning tokens when not biasing
		let parameters = effort_parameters(self.task_config.effort.as_ref(), request.effort);
		let effort_config = self.task_config.effort.clone().unwrap_or_default();
		let marker = match self.marker_token_id(&effort_config) {
			Ok(marker) => Some(marker),
			Err(e) if parameters.is_none() => {
				tracing::debug!("not counting reasoning tokens: {e}");
				None
			}
			Err(e) => return Err(e),
		};

		// Set up samplers. The effort sampler needs to see the raw logits, so it goes first.
		let mut samplers = SamplerChain::new();
		if let (Some(parameters), Some(marker)) = (&parameters, marker) {
			let policy = EffortBiasPolicy::from_parameters(parameters, marker, 1);
			tracing::info!(
				thinking_effort = policy.thinking_effort(),
				scale_factor = policy.scale_factor(),
				bias = policy.bias(),
				marker,
				"biasing end-of-reasoning marker"
			);
			samplers.push_sampler(SampleThinkingEffort::new(policy));
		}
		let configured = ConfiguredSamplers::from_str(&self.task_config.sampler).map_err(|e| GenerateError::InvalidSampler(e.to_string()))?;
		samplers += configured.builder.into_chain();
		tracing::debug!("sampler: {samplers:?}");
		let inference_params = InferenceParameters {
			sampler: Arc::new(Mutex::new(samplers)),
		};

		let mut rng = match self.task_config.seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};

		// Inference loop
		let mut result_buffer = TokenUtf8Buffer::new();
		let vocabulary = self.model.tokenizer();
		let mut text = String::new();
		let mut tokens_generated: usize = 0;
		let mut reasoning_tokens = None;

		let stop_reason = loop {
			if let Some(max_tokens) = self.task_config.max_tokens {
				if tokens_generated >= max_tokens {
					break StopReason::MaxTokens;
				}
			}

			let start = Instant::now();
			let out = match self
				.session
				.infer_next_token(self.model.as_ref().as_ref(), &inference_params, &mut OutputRequest::default(), &mut rng)
			{
				Ok(out) => out,
				Err(InferenceError::EndOfText) => break StopReason::EndOfText,
				Err(InferenceError::ContextFull) => {
					tracing::warn!("ending generation because context is full");
					break StopReason::ContextFull;
				}
				Err(e) => return Err(e.into()),
			};
			completion_stats.add(&InferenceStats {
				feed_prompt_duration: Duration::ZERO,
				prompt_tokens: 0,
				predict_duration: Instant::now().duration_since(start),
				predict_tokens: 1,
			});
			tokens_generated += 1;

			if reasoning_tokens.is_none() && marker.is_some() && vocabulary.id(&out) == marker {
				tracing::debug!(tokens_generated, "end of reasoning");
				reasoning_tokens = Some(tokens_generated);
			}

			if let Some(output) = result_buffer.push(&out) {
				tracing::trace!("text: {output}");
				text.push_str(&output);
				match callback(InferenceResponse::InferredToken(output))? {
					InferenceFeedback::Continue => {}
					InferenceFeedback::Halt => break StopReason::Halted,
				}
			}
		};

		Ok(Completion {
			text,
			tokens_generated,
			reasoning_tokens,
			stop_reason,
			stats: completion_stats,
		})
	}
}
