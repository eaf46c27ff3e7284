use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{TokenId, DEFAULT_SCALE_FACTOR, NEUTRAL_EFFORT};

/// How a sequence is determined to have emitted the end-of-reasoning marker
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarkerDetection {
	/// The sequence is done reasoning once its most recently generated token is the marker
	#[default]
	LastToken,

	/// The sequence is done reasoning once the marker occurs anywhere in its history
	AnyInHistory,
}

impl MarkerDetection {
	fn matches(&self, history: &[TokenId], marker: TokenId) -> bool {
		match self {
			MarkerDetection::LastToken => history.last() == Some(&marker),
			MarkerDetection::AnyInHistory => history.contains(&marker),
		}
	}
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EffortParameters {
	/// Desired reasoning depth. At 1.0 the marker is left alone, lower values make the model stop reasoning sooner,
	/// higher values make it reason longer.
	#[serde(default = "default_thinking_effort")]
	pub thinking_effort: f64,

	/// Base of the bias exponent; larger values make deviations from an effort of 1.0 more pronounced
	#[serde(default = "default_scale_factor")]
	pub scale_factor: f64,

	/// How to tell whether a sequence has emitted the marker
	#[serde(default)]
	pub detection: MarkerDetection,
}

const fn default_thinking_effort() -> f64 {
	NEUTRAL_EFFORT
}

const fn default_scale_factor() -> f64 {
	DEFAULT_SCALE_FACTOR
}

impl Default for EffortParameters {
	fn default() -> Self {
		Self {
			thinking_effort: NEUTRAL_EFFORT,
			scale_factor: DEFAULT_SCALE_FACTOR,
			detection: MarkerDetection::default(),
		}
	}
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffortError {
	#[error("marker token {marker} is out of range for a vocabulary of {vocab_size} tokens")]
	MarkerOutOfRange { marker: TokenId, vocab_size: usize },

	#[error("row {row} is out of range for a batch of {batch_size} sequences")]
	RowOutOfRange { row: usize, batch_size: usize },

	#[error("got {histories} token histories for {rows} rows of logits")]
	BatchMismatch { histories: usize, rows: usize },
}

/// Scales the logit of the end-of-reasoning marker by `scale_factor ^ (1 - thinking_effort)` at every decoding step,
/// until the marker has been generated for a sequence. From then on that sequence is left alone for the rest of the
/// session.
///
/// The scaling is applied to pre-softmax scores and the other logits are not renormalized, so the resulting shift in
/// probability depends on the rest of the distribution at each step.
#[derive(Debug, Clone)]
pub struct EffortBiasPolicy {
	thinking_effort: f64,
	scale_factor: f64,
	marker_token_id: TokenId,
	detection: MarkerDetection,
	bias: f64,

	/// Per row: whether the marker has been emitted
	finished: Vec<bool>,
}

impl EffortBiasPolicy {
	pub fn new(thinking_effort: f64, marker_token_id: TokenId, scale_factor: f64, batch_size: usize) -> EffortBiasPolicy {
		if !(scale_factor > 0.0 && scale_factor.is_finite()) {
			tracing::warn!(scale_factor, "scale factor is not a positive number, the effort bias will behave unexpectedly");
		}
		let bias = scale_factor.powf(1.0 - thinking_effort);
		tracing::debug!(thinking_effort, scale_factor, marker_token_id, bias, batch_size, "effort bias policy created");

		EffortBiasPolicy {
			thinking_effort,
			scale_factor,
			marker_token_id,
			detection: MarkerDetection::default(),
			bias,
			finished: vec![false; batch_size.max(1)],
		}
	}

	/// Policy for a single sequence with the default scale factor
	pub fn single(thinking_effort: f64, marker_token_id: TokenId) -> EffortBiasPolicy {
		Self::new(thinking_effort, marker_token_id, DEFAULT_SCALE_FACTOR, 1)
	}

	pub fn from_parameters(parameters: &EffortParameters, marker_token_id: TokenId, batch_size: usize) -> EffortBiasPolicy {
		Self::new(parameters.thinking_effort, marker_token_id, parameters.scale_factor, batch_size).with_detection(parameters.detection)
	}

	pub fn with_detection(mut self, detection: MarkerDetection) -> EffortBiasPolicy {
		self.detection = detection;
		self
	}

	/// The factor the marker logit is multiplied with
	pub fn bias(&self) -> f64 {
		self.bias
	}

	pub fn thinking_effort(&self) -> f64 {
		self.thinking_effort
	}

	pub fn scale_factor(&self) -> f64 {
		self.scale_factor
	}

	pub fn marker_token_id(&self) -> TokenId {
		self.marker_token_id
	}

	pub fn detection(&self) -> MarkerDetection {
		self.detection
	}

	pub fn batch_size(&self) -> usize {
		self.finished.len()
	}

	/// Whether the marker has been seen for the given row (rows outside the batch never are)
	pub fn is_finished(&self, row: usize) -> bool {
		self.finished.get(row).copied().unwrap_or(false)
	}

	/// Update the state of `row` from its token history and return whether its marker logit should be scaled in
	/// this step. The step in which the marker is first seen is not biased.
	pub fn observe(&mut self, row: usize, history: &[TokenId]) -> Result<bool, EffortError> {
		let batch_size = self.finished.len();
		let finished = self.finished.get_mut(row).ok_or(EffortError::RowOutOfRange { row, batch_size })?;
		if *finished {
			return Ok(false);
		}

		if self.detection.matches(history, self.marker_token_id) {
			*finished = true;
			tracing::debug!(row, marker = self.marker_token_id, "marker token generated, no longer biasing this sequence");
			return Ok(false);
		}
		Ok(true)
	}

	/// Perform one decoding step for a single row
	pub fn apply_row(&mut self, row: usize, history: &[TokenId], logits: &mut [f32]) -> Result<(), EffortError> {
		if self.observe(row, history)? {
			let vocab_size = logits.len();
			let logit = logits.get_mut(self.marker_token_id as usize).ok_or(EffortError::MarkerOutOfRange {
				marker: self.marker_token_id,
				vocab_size,
			})?;
			*logit *= self.bias as f32;
			tracing::trace!(row, logit = *logit, "biased marker logit");
		}
		Ok(())
	}

	/// Perform one decoding step for a single-sequence policy
	pub fn step(&mut self, history: &[TokenId], logits: &mut [f32]) -> Result<(), EffortError> {
		self.apply_row(0, history, logits)
	}

	/// Perform one decoding step for a batch: `recent_tokens[i]` is the history of the sequence whose next-token
	/// logits are `logits[i]`.
	pub fn apply<H, L>(&mut self, recent_tokens: &[H], logits: &mut [L]) -> Result<(), EffortError>
	where
		H: AsRef<[TokenId]>,
		L: AsMut<[f32]>,
	{
		if recent_tokens.len() != logits.len() {
			return Err(EffortError::BatchMismatch {
				histories: recent_tokens.len(),
				rows: logits.len(),
			});
		}

		let batch_size = self.finished.len();
		if logits.len() > batch_size {
			return Err(EffortError::RowOutOfRange { row: batch_size, batch_size });
		}

		// Bounds are checked for all rows first, so that a bad marker leaves the whole batch untouched
		let marker = self.marker_token_id;
		for (row, scores) in logits.iter_mut().enumerate() {
			let vocab_size = scores.as_mut().len();
			if !self.finished[row] && marker as usize >= vocab_size {
				return Err(EffortError::MarkerOutOfRange { marker, vocab_size });
			}
		}

		for (row, (history, scores)) in recent_tokens.iter().zip(logits.iter_mut()).enumerate() {
			self.apply_row(row, history.as_ref(), scores.as_mut())?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::MarkerDetection;

	#[test]
	fn test_detection_modes() {
		assert!(!MarkerDetection::LastToken.matches(&[], 5));
		assert!(!MarkerDetection::AnyInHistory.matches(&[], 5));
		assert!(MarkerDetection::LastToken.matches(&[1, 2, 5], 5));
		assert!(!MarkerDetection::LastToken.matches(&[5, 2, 1], 5));
		assert!(MarkerDetection::AnyInHistory.matches(&[5, 2, 1], 5));
	}
}
