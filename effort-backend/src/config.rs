use effort_bias::{EffortParameters, TokenId, DEFAULT_MARKER};
pub use llm::ModelArchitecture;
use serde::{Deserialize, Deserializer};
use std::{collections::HashMap, path::PathBuf};

fn architecture_from_str<'de, D>(deserializer: D) -> Result<ModelArchitecture, D::Error>
where
	D: Deserializer<'de>,
{
	let s: String = Deserialize::deserialize(deserializer)?;
	match s.as_str() {
		"gptneox" => Ok(ModelArchitecture::GptNeoX),
		"mpt" => Ok(ModelArchitecture::Mpt),
		"llama" => Ok(ModelArchitecture::Llama),
		"gpt2" => Ok(ModelArchitecture::Gpt2),
		"gptj" => Ok(ModelArchitecture::GptJ),
		"bloom" => Ok(ModelArchitecture::Bloom),
		_ => Err(serde::de::Error::custom("invalid model architecture name")),
	}
}

#[derive(Deserialize, Debug, Clone)]
pub struct ModelConfig {
	/// The model architecture type
	#[serde(deserialize_with = "architecture_from_str")]
	pub architecture: ModelArchitecture,

	/// Path to the model file
	pub model_path: PathBuf,

	/// Threads per session
	#[serde(default = "default_threads_per_session")]
	pub threads_per_session: usize,

	/// Context size. Reasoning models produce long completions, so this should be generous.
	#[serde(default = "default_context_size")]
	pub context_size: usize,

	/// Whether to use GPU acceleration, if available
	#[serde(default = "default_use_gpu")]
	pub use_gpu: bool,

	/// Number of layers to offload to the GPU (ignored when `use_gpu` is false; when this is `None`, all layers will
	///  be offloaded. For Metal, all layers will always be offloaded regardless of this setting)
	pub gpu_layers: Option<usize>,

	/// Number of prompt tokens ingested at once while feeding the prompt
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
}

const fn default_use_gpu() -> bool {
	false
}

const fn default_threads_per_session() -> usize {
	8
}

const fn default_context_size() -> usize {
	2048
}

const fn default_batch_size() -> usize {
	8
}

/// Configuration of the thinking effort bias for a task
#[derive(Deserialize, Debug, Clone)]
pub struct EffortConfig {
	/// Text of the end-of-reasoning marker, looked up in the model's vocabulary
	#[serde(default = "default_marker")]
	pub marker: String,

	/// Token ID of the marker. When set, this is used instead of looking up `marker`.
	pub marker_token_id: Option<TokenId>,

	#[serde(flatten)]
	pub parameters: EffortParameters,
}

fn default_marker() -> String {
	String::from(DEFAULT_MARKER)
}

impl Default for EffortConfig {
	fn default() -> Self {
		Self {
			marker: default_marker(),
			marker_token_id: None,
			parameters: EffortParameters::default(),
		}
	}
}

#[derive(Deserialize, Debug, Clone)]
pub struct TaskConfig {
	pub model: String,

	/// Text to prefix each user input with (e.g. the opening of a chat template)
	pub prefix: Option<String>,

	/// Text to postfix each user input with. For reasoning models this usually ends with the opening reasoning tag.
	pub postfix: Option<String>,

	/// Maximum number of tokens to be generated
	pub max_tokens: Option<usize>,

	/// Sampler chain description, in the syntax accepted by `llm` (e.g. "temperature:temperature=0.6"). The thinking
	/// effort sampler is always placed in front of these.
	#[serde(default)]
	pub sampler: String,

	/// Seed for the random number generator used while sampling. When not set, a random seed is used.
	pub seed: Option<u64>,

	/// Thinking effort bias; when not set, completions are not biased unless a request asks for it
	pub effort: Option<EffortConfig>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct BackendConfig {
	/// Models that are used
	pub models: HashMap<String, ModelConfig>,

	/// Tasks that are made available
	pub tasks: HashMap<String, TaskConfig>,
}
