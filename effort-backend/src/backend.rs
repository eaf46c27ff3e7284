use std::{collections::HashMap, sync::Arc};

pub use llm::{InferenceFeedback, InferenceResponse};
use llm::{InferenceSessionConfig, ModelParameters, TokenizerSource};

use crate::{
	config::BackendConfig,
	session::BackendSession,
	stats::{BackendStats, TaskStats},
	types::GenerateError,
};

use tracing::*;

pub struct Backend {
	pub config: BackendConfig,
	pub models: HashMap<String, Arc<Box<dyn llm::Model>>>,
	pub stats: Arc<BackendStats>,
}

impl Backend {
	/// Load all configured models and verify that every task refers to one of them
	pub fn from(config: BackendConfig) -> Result<Backend, GenerateError> {
		// Verify tasks before spending time on loading models
		for (task_name, task_config) in &config.tasks {
			if !config.models.contains_key(&task_config.model) {
				return Err(GenerateError::ModelNotFound(format!("{} (used by task {task_name})", task_config.model)));
			}
		}

		tracing::info!(metal = cfg!(feature = "metal"), cublas = cfg!(feature = "cublas"), "backend instantiating");
		let mut models = HashMap::new();

		for (model_name, model_config) in config.models.iter() {
			// Warn about invalid configurations
			if !model_config.use_gpu && model_config.gpu_layers.is_some() {
				tracing::warn!("gpu_layers set but ignored because use_gpu is not set to true");
			}
			if cfg!(feature = "metal") && model_config.use_gpu && model_config.gpu_layers.is_some() {
				tracing::warn!("gpu_layers set but ignored because with the Metal backend, all layers are run on the GPU");
			}

			let params = ModelParameters {
				prefer_mmap: true,
				context_size: model_config.context_size,
				lora_adapters: None,
				use_gpu: model_config.use_gpu,
				gpu_layers: model_config.gpu_layers,
				..Default::default()
			};

			let model = llm::load_dynamic(
				Some(model_config.architecture.clone()),
				&model_config.model_path,
				TokenizerSource::Embedded,
				params,
				|load_progress| {
					trace!("Loading model {model_name}: {load_progress:#?}");
				},
			)
			.map_err(|e| GenerateError::ModelLoad(model_name.clone(), e.to_string()))?;

			info!("Loaded model {} use_gpu={:?}", model_name, model_config.use_gpu);
			models.insert(model_name.clone(), Arc::new(model));
		}

		info!("All models loaded");
		Ok(Backend {
			config,
			models,
			stats: Arc::new(BackendStats::default()),
		})
	}

	/// Start a fresh inference session for a task
	pub fn start(&self, task_name: &str) -> Result<BackendSession, GenerateError> {
		debug!("Start session {task_name}");

		let task_config = self
			.config
			.tasks
			.get(task_name)
			.ok_or_else(|| GenerateError::TaskNotFound(task_name.to_string()))?;

		let model = self
			.models
			.get(&task_config.model)
			.ok_or_else(|| GenerateError::ModelNotFound(task_config.model.clone()))?;
		let model_config = &self.config.models[&task_config.model];

		let inference_config = InferenceSessionConfig {
			n_threads: model_config.threads_per_session,
			n_batch: model_config.batch_size,
			..InferenceSessionConfig::default()
		};
		let session = model.start_session(inference_config);

		Ok(BackendSession {
			model: model.clone(),
			session,
			task_config: task_config.clone(),
			stats: self.stats.clone(),
			task_name: task_name.to_string(),
			n_threads: model_config.threads_per_session,
		})
	}

	/// Statistics collected so far for a task
	pub fn task_stats(&self, task_name: &str) -> Option<TaskStats> {
		self.stats.get(task_name)
	}
}
