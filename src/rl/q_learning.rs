// src/rl/q_learning.rs

use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{FeatureValue, FeedbackKind, RawFeatureSet};

/// The fixed action space: signed adjustments applied to a base score.
pub const ACTIONS: [i32; 5] = [-2, -1, 0, 1, 2];

/// Online tabular Q-learning layer that nudges the base score by a small
/// signed adjustment learned from user feedback.
///
/// State is the quantized base score plus, when present in the originating
/// request, low-cardinality studytime/failures buckets. The table is sparse:
/// a state is inserted on first update, and an absent entry reads as all
/// zeros. Feedback application is the only mutation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QAdjustmentLayer {
    // StateKey -> expected return per action, indexed by action position.
    q_table: HashMap<String, [f64; 5]>,
    learning_rate: f64,
    discount_factor: f64,
    epsilon: f64,
    // Aggregate reward statistics; the full episode history is not retained.
    reward_sum: f64,
    reward_count: u64,
}

impl QAdjustmentLayer {
    pub fn new(learning_rate: f64, discount_factor: f64, epsilon: f64) -> Self {
        Self {
            q_table: HashMap::new(),
            learning_rate,
            discount_factor,
            // Exploration probability; out-of-range values would panic in
            // gen_bool at selection time.
            epsilon: epsilon.clamp(0.0, 1.0),
            reward_sum: 0.0,
            reward_count: 0,
        }
    }

    /// Deterministic state key for a base score and optional request context.
    /// Identical inputs always produce an identical key.
    pub fn state_key(score: i32, features: Option<&RawFeatureSet>) -> String {
        let mut key = format!("score_{}", score);
        if let Some(features) = features {
            if let Some(studytime) = context_bucket(features, "studytime") {
                key.push_str(&format!("_st{}", studytime));
            }
            if let Some(failures) = context_bucket(features, "failures") {
                key.push_str(&format!("_f{}", failures));
            }
        }
        key
    }

    fn q_values(&self, state: &str) -> [f64; 5] {
        self.q_table.get(state).copied().unwrap_or([0.0; 5])
    }

    /// Epsilon-greedy action selection with uniform random tie-breaking
    /// among maximizers. With `explore` false the epsilon branch is skipped
    /// and only tie-breaks consume randomness.
    pub fn select_action(&self, state: &str, explore: bool, rng: &mut StdRng) -> i32 {
        if explore && rng.gen_bool(self.epsilon) {
            let action = ACTIONS[rng.gen_range(0..ACTIONS.len())];
            debug!("Q-layer EXPLORE in state '{}': action {}", state, action);
            return action;
        }

        let q = self.q_values(state);
        let max_q = q.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let best: Vec<usize> = (0..ACTIONS.len()).filter(|&i| q[i] == max_q).collect();
        let action = ACTIONS[best[rng.gen_range(0..best.len())]];
        debug!(
            "Q-layer EXPLOIT in state '{}': action {} (max Q {:.4}, {} maximizers)",
            state,
            action,
            max_q,
            best.len()
        );
        action
    }

    /// One-step Q-learning update:
    /// `Q(s,a) <- Q(s,a) + alpha * (r + gamma * max_a' Q(s',a') - Q(s,a))`.
    fn update(&mut self, state: &str, action: i32, reward: f64, next_state: &str) {
        let next_max = self
            .q_values(next_state)
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);

        let entry = self.q_table.entry(state.to_string()).or_insert([0.0; 5]);
        let idx = action_index(action);
        let current = entry[idx];
        entry[idx] = current + self.learning_rate * (reward + self.discount_factor * next_max - current);

        self.reward_sum += reward;
        self.reward_count += 1;
    }

    /// Applies a feedback signal for a prediction whose quantized base score
    /// was `base_score`. The feedback kind fixes both the action that should
    /// have been taken and the reward; the next state is the score that
    /// action would have produced, under the same request context.
    pub fn apply_feedback(
        &mut self,
        base_score: i32,
        kind: FeedbackKind,
        features: Option<&RawFeatureSet>,
    ) {
        let optimal_action = kind.optimal_action();
        let reward = kind.reward();

        let state = Self::state_key(base_score, features);
        let next_score = (base_score + optimal_action).clamp(1, 10);
        let next_state = Self::state_key(next_score, features);

        self.update(&state, optimal_action, reward, &next_state);
        debug!(
            "Applied '{}' feedback: state '{}', action {}, reward {:.1}",
            kind.as_str(),
            state,
            optimal_action,
            reward
        );
    }

    /// Expected return currently stored for one state/action pair.
    pub fn q_value(&self, state: &str, action: i32) -> f64 {
        self.q_values(state)[action_index(action)]
    }

    pub fn table_size(&self) -> usize {
        self.q_table.len()
    }

    pub fn episodes(&self) -> u64 {
        self.reward_count
    }

    pub fn average_reward(&self) -> f64 {
        if self.reward_count == 0 {
            0.0
        } else {
            self.reward_sum / self.reward_count as f64
        }
    }

    /// All-or-nothing reset; the table is never partially cleared.
    pub fn reset(&mut self) {
        self.q_table.clear();
        self.reward_sum = 0.0;
        self.reward_count = 0;
    }
}

fn action_index(action: i32) -> usize {
    (action + 2) as usize
}

fn context_bucket(features: &RawFeatureSet, attr: &str) -> Option<i64> {
    features
        .get(attr)
        .and_then(FeatureValue::as_num)
        .map(|v| v as i64)
}
