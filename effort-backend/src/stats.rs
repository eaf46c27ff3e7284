use std::{collections::HashMap, sync::Mutex, time::Duration};

use llm::InferenceStats;
use serde::Serialize;

use crate::types::Completion;

pub trait InferenceStatsAdd {
	fn add(&mut self, stats: &InferenceStats);
}

impl InferenceStatsAdd for InferenceStats {
	fn add(&mut self, stats: &InferenceStats) {
		self.predict_duration += stats.predict_duration;
		self.predict_tokens += stats.predict_tokens;
		self.prompt_tokens += stats.prompt_tokens;
		self.feed_prompt_duration += stats.feed_prompt_duration;
	}
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct TaskStats {
	/// Number of completions that were finished for this task
	pub cycles: usize,

	/// Total duration of prediction measured in thread-time
	pub predict_duration: Duration,
	pub predict_duration_threads: Duration,
	pub predict_tokens: usize,

	/// Total duration of prompt feeding measured in thread-time
	pub prompt_duration: Duration,
	pub prompt_duration_threads: Duration,
	pub prompt_tokens: usize,

	/// Completions in which the end-of-reasoning marker was generated, and the tokens spent reasoning in those
	pub reasoning_cycles: usize,
	pub reasoning_tokens: usize,
}

impl TaskStats {
	pub fn add_cycle(&mut self, completion: &Completion, n_threads: usize) {
		let stats = &completion.stats;
		self.predict_tokens += stats.predict_tokens;
		self.prompt_tokens += stats.prompt_tokens;
		self.prompt_duration += stats.feed_prompt_duration;
		self.prompt_duration_threads += stats.feed_prompt_duration * (n_threads as u32);

		self.predict_duration += stats.predict_duration;
		self.predict_duration_threads += stats.predict_duration * (n_threads as u32);
		self.cycles += 1;

		if let Some(reasoning_tokens) = completion.reasoning_tokens {
			self.reasoning_cycles += 1;
			self.reasoning_tokens += reasoning_tokens;
		}
	}

	/// Average number of reasoning tokens over the completions that finished reasoning
	pub fn mean_reasoning_tokens(&self) -> Option<f64> {
		if self.reasoning_cycles == 0 {
			None
		} else {
			Some(self.reasoning_tokens as f64 / self.reasoning_cycles as f64)
		}
	}
}

#[derive(Default)]
pub struct BackendStats {
	pub task_stats: Mutex<HashMap<String, TaskStats>>,
}

impl BackendStats {
	pub fn add(&self, task_name: &str, completion: &Completion, n_threads: usize) {
		let mut ts = self.task_stats.lock().unwrap();
		ts.entry(task_name.to_string()).or_default().add_cycle(completion, n_threads);
	}

	pub fn get(&self, task_name: &str) -> Option<TaskStats> {
		self.task_stats.lock().unwrap().get(task_name).cloned()
	}
}
