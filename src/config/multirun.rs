//! Parameter sweeps
//!
//! `key=a,b` in multirun mode yields one job per value; several sweeps form
//! the cartesian product, the first sweep varying slowest. Jobs run in
//! parallel, each with its own fragment list and runtime context.

use super::overrides::split_sweep;
use super::{resolve, ResolveRequest, ResolvedConfig};
use crate::error::Result;
use crate::registry::SchemaRegistry;
use rayon::prelude::*;

/// Outcome of one sweep job.
#[derive(Debug)]
pub struct RunResult {
    pub index: usize,
    pub overrides: Vec<String>,
    pub result: Result<ResolvedConfig>,
}

/// Expand sweep tokens into one override list per job.
pub fn expand_sweeps<S: AsRef<str>>(tokens: &[S]) -> Vec<Vec<String>> {
    tokens.iter().fold(vec![Vec::new()], |jobs, token| {
        let choices = sweep_choices(token.as_ref());
        jobs.iter()
            .flat_map(|job| {
                choices.iter().map(move |choice| {
                    let mut next = job.clone();
                    next.push(choice.clone());
                    next
                })
            })
            .collect()
    })
}

fn sweep_choices(token: &str) -> Vec<String> {
    if token.starts_with('~') {
        return vec![token.to_string()];
    }
    match token.split_once('=') {
        Some((key, value)) => split_sweep(value)
            .into_iter()
            .map(|choice| format!("{}={}", key, choice.trim()))
            .collect(),
        None => vec![token.to_string()],
    }
}

/// Resolve every job of the sweep described by `base`. When `base` has an
/// output directory, job `i` writes under `<output_dir>/<i>`.
pub fn resolve_sweep(registry: &SchemaRegistry, base: &ResolveRequest) -> Vec<RunResult> {
    let jobs = expand_sweeps(base.overrides_tokens());
    tracing::info!("Launching {} job(s)", jobs.len());

    jobs.into_par_iter()
        .enumerate()
        .map(|(index, overrides)| {
            let mut request = base.clone().overrides(overrides.clone());
            if let Some(dir) = base.output_dir_path() {
                request = request.output_dir(dir.join(index.to_string()));
            }
            let result = resolve(registry, &request);
            if let Err(e) = &result {
                tracing::debug!("job #{} failed: {}", index, e);
            }
            RunResult { index, overrides, result }
        })
        .collect()
}
