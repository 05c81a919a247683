//! Utilities for interaction of policies and environments.
use crate::{
    record::{Record, RecordValue, Recorder},
    Env, Policy,
};
use anyhow::Result;
use log::{info, trace};

/// Runs a policy on a vectorized environment for `n_steps` steps.
///
/// Every step writes a record with the mean reward over instances and the
/// number of instances reset in the step. Episode statistics reported by the
/// environment are stored in the recorder and flushed once at the end.
///
/// Returns the mean reward of each step.
pub fn rollout<E, P, R>(
    env: &mut E,
    policy: &mut P,
    n_steps: usize,
    recorder: &mut R,
) -> Result<Vec<f32>>
where
    E: Env,
    P: Policy<E>,
    R: Recorder,
{
    let mut obs = env.reset()?;
    let mut rs = Vec::with_capacity(n_steps);
    let mut n_episodes = 0;

    for count_step in 0..n_steps {
        let act = policy.sample(&obs);
        let (step, episode_record) = env.step(&act)?;

        let n_envs = step.reward.len().max(1);
        let reward_mean = step.reward.iter().sum::<f32>() / n_envs as f32;
        let n_resets = step.done_indices().len();
        n_episodes += n_resets;
        trace!("step {}: reward_mean = {}, resets = {}", count_step, reward_mean, n_resets);

        let mut record = Record::empty();
        record.insert("reward_mean", RecordValue::Scalar(reward_mean));
        record.insert("n_resets", RecordValue::Scalar(n_resets as _));
        record.insert("step", RecordValue::Scalar(count_step as _));
        recorder.write(record);

        if !episode_record.is_empty() {
            recorder.store(episode_record);
        }

        rs.push(reward_mean);
        obs = step.obs;
    }

    recorder.flush(n_steps as _);
    info!("Rollout finished: {} steps, {} episodes ended", n_steps, n_episodes);

    Ok(rs)
}
