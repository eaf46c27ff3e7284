use effort_bias::{
	processor::{thinking_effort_processor, ThinkingEffortProcessor},
	EffortError, EffortParameters, LogitsProcessor, MarkerDetection, NullProcessor, TokenId,
};
use tracing_test::traced_test;

const END_THINKING: TokenId = 4;

fn scores(rows: usize) -> Vec<Vec<f32>> {
	vec![vec![2.0; 8]; rows]
}

#[traced_test]
#[test]
pub fn test_null_processor() {
	let mut processor = NullProcessor {};
	let mut s = scores(2);
	processor.process(&[vec![1], vec![END_THINKING]], &mut s).unwrap();
	assert_eq!(s, scores(2));
}

#[traced_test]
#[test]
pub fn test_batched_processor() {
	let mut processor = ThinkingEffortProcessor::new(END_THINKING, 0.0, 2.0);
	assert!(processor.policy().is_none());

	let mut s = scores(2);
	processor.process(&[vec![1, 2], vec![1, 3]], &mut s).unwrap();
	assert_eq!(processor.policy().unwrap().batch_size(), 2);
	assert_eq!(s[0][END_THINKING as usize], 4.0);
	assert_eq!(s[1][END_THINKING as usize], 4.0);

	// Second row ends its reasoning
	let mut s = scores(2);
	processor.process(&[vec![1, 2, 7], vec![1, 3, END_THINKING]], &mut s).unwrap();
	assert_eq!(s[0][END_THINKING as usize], 4.0);
	assert_eq!(s[1], scores(1)[0]);

	let mut s = scores(2);
	processor.process(&[vec![1, 2, 7, 7], vec![1, 3, END_THINKING, 6]], &mut s).unwrap();
	assert_eq!(s[0][END_THINKING as usize], 4.0);
	assert_eq!(s[1], scores(1)[0]);
}

#[traced_test]
#[test]
pub fn test_batched_processor_checks_whole_history() {
	// The marker was produced in an earlier step that this processor did not see
	let mut processor = ThinkingEffortProcessor::new(END_THINKING, 0.0, 2.0);
	let mut s = scores(1);
	processor.process(&[vec![END_THINKING, 1, 2]], &mut s).unwrap();
	assert_eq!(s, scores(1));
}

#[traced_test]
#[test]
pub fn test_batched_processor_batch_cannot_grow() {
	let mut processor = ThinkingEffortProcessor::new(END_THINKING, 0.0, 2.0);
	processor.process(&[vec![1]], &mut scores(1)).unwrap();
	assert_eq!(
		processor.process(&[vec![1], vec![1]], &mut scores(2)),
		Err(EffortError::RowOutOfRange { row: 1, batch_size: 1 })
	);
}

#[traced_test]
#[test]
pub fn test_processor_from_json_parameters() {
	let parameters: EffortParameters = serde_json::from_str(r#"{"thinking_effort": 2.0, "scale_factor": 4.0}"#).unwrap();
	assert_eq!(parameters.detection, MarkerDetection::LastToken);

	let mut processor = ThinkingEffortProcessor::with_parameters(END_THINKING, parameters);
	let mut s = scores(1);
	processor.process(&[vec![END_THINKING, 1]], &mut s).unwrap();
	assert_eq!(s[0][END_THINKING as usize], 0.5);
}

#[traced_test]
#[test]
pub fn test_step_closure() {
	let mut process = thinking_effort_processor(0.0, END_THINKING, 4.0);

	let mut logits: Vec<f32> = vec![1.0; 8];
	process(&[1, 2], &mut logits).unwrap();
	assert_eq!(logits[END_THINKING as usize], 4.0);

	let mut logits: Vec<f32> = vec![1.0; 8];
	process(&[1, 2, 3], &mut logits).unwrap();
	assert_eq!(logits[END_THINKING as usize], 4.0);

	let mut logits: Vec<f32> = vec![1.0; 8];
	process(&[1, 2, 3, END_THINKING], &mut logits).unwrap();
	assert_eq!(logits, vec![1.0; 8]);

	let mut logits: Vec<f32> = vec![1.0; 8];
	process(&[1, 2, 3, END_THINKING, 0], &mut logits).unwrap();
	assert_eq!(logits, vec![1.0; 8]);
}

#[traced_test]
#[test]
pub fn test_step_closure_small_vocabulary() {
	let mut process = thinking_effort_processor(0.5, END_THINKING, 2.0);
	let mut logits: Vec<f32> = vec![1.0; 3];
	assert!(matches!(
		process(&[1], &mut logits),
		Err(EffortError::MarkerOutOfRange { marker: END_THINKING, vocab_size: 3 })
	));
}
