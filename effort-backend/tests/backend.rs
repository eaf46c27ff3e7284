use std::time::Duration;

use effort_backend::{
	backend::Backend,
	config::{BackendConfig, ModelArchitecture},
	stats::TaskStats,
	types::{Completion, GenerateError, StopReason},
};
use effort_bias::{MarkerDetection, DEFAULT_MARKER};
use llm::InferenceStats;
use tracing_test::traced_test;

const CONFIG: &str = r#"
[models.qwq]
architecture = "llama"
model_path = "data/does-not-exist.bin"
context_size = 131072

[tasks.think]
model = "qwq"
prefix = "<|im_start|>user\n"
postfix = "\n<|im_end|>\n<|im_start|>assistant\n<think>\n"
max_tokens = 8048
seed = 42

[tasks.think.effort]
thinking_effort = 0.0
scale_factor = 4
marker_token_id = 151668

[tasks.plain]
model = "qwq"
"#;

#[traced_test]
#[test]
pub fn test_parse_config() {
	let config: BackendConfig = toml::from_str(CONFIG).unwrap();

	let model = &config.models["qwq"];
	assert!(matches!(model.architecture, ModelArchitecture::Llama));
	assert_eq!(model.context_size, 131072);
	assert_eq!(model.threads_per_session, 8);
	assert!(!model.use_gpu);

	let think = &config.tasks["think"];
	assert_eq!(think.max_tokens, Some(8048));
	assert_eq!(think.seed, Some(42));
	assert_eq!(think.sampler, "");
	let effort = think.effort.as_ref().unwrap();
	assert_eq!(effort.marker, DEFAULT_MARKER);
	assert_eq!(effort.marker_token_id, Some(151668));
	assert_eq!(effort.parameters.thinking_effort, 0.0);
	assert_eq!(effort.parameters.scale_factor, 4.0);
	assert_eq!(effort.parameters.detection, MarkerDetection::LastToken);

	let plain = &config.tasks["plain"];
	assert!(plain.effort.is_none());
	assert!(plain.prefix.is_none());
}

#[traced_test]
#[test]
pub fn test_invalid_architecture() {
	let config = CONFIG.replace("\"llama\"", "\"transformer\"");
	assert!(toml::from_str::<BackendConfig>(&config).is_err());
}

#[traced_test]
#[test]
pub fn test_task_with_unknown_model() {
	let config: BackendConfig = toml::from_str(&format!("{CONFIG}\n[tasks.other]\nmodel = \"r1\"\n")).unwrap();
	assert!(matches!(Backend::from(config), Err(GenerateError::ModelNotFound(_))));
}

#[traced_test]
#[test]
pub fn test_missing_model_file() {
	let config: BackendConfig = toml::from_str(CONFIG).unwrap();
	match Backend::from(config) {
		Err(GenerateError::ModelLoad(name, _)) => assert_eq!(name, "qwq"),
		Err(e) => panic!("unexpected error: {e}"),
		Ok(_) => panic!("model should not load"),
	}
}

fn completion(reasoning_tokens: Option<usize>, predict_tokens: usize) -> Completion {
	Completion {
		text: String::new(),
		tokens_generated: predict_tokens,
		reasoning_tokens,
		stop_reason: StopReason::EndOfText,
		stats: InferenceStats {
			feed_prompt_duration: Duration::from_millis(100),
			prompt_tokens: 10,
			predict_duration: Duration::from_millis(500),
			predict_tokens,
		},
	}
}

#[traced_test]
#[test]
pub fn test_task_stats() {
	let mut stats = TaskStats::default();
	assert_eq!(stats.mean_reasoning_tokens(), None);

	stats.add_cycle(&completion(Some(100), 150), 4);
	stats.add_cycle(&completion(None, 300), 4);
	stats.add_cycle(&completion(Some(50), 60), 4);

	assert_eq!(stats.cycles, 3);
	assert_eq!(stats.predict_tokens, 510);
	assert_eq!(stats.prompt_tokens, 30);
	assert_eq!(stats.predict_duration, Duration::from_millis(1500));
	assert_eq!(stats.predict_duration_threads, Duration::from_millis(6000));
	assert_eq!(stats.reasoning_cycles, 2);
	assert_eq!(stats.mean_reasoning_tokens(), Some(75.0));
}
