//! Selection of stale step-numbered output directories.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// How many of the most recent step numbers survive a cleanup.
pub const KEEP_GENERATIONS: usize = 2;

static STEP_DIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^stage_?\d+_(?:.*_)?step_(\d+)(_encoder)?$").expect("step directory pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDir<'a> {
    pub name: &'a str,
    pub step: u64,
    pub encoder: bool,
}

/// Recognizes `stage<N>_..._step_<K>` and its `_encoder` companion.
pub fn parse_step_dir(name: &str) -> Option<StepDir<'_>> {
    let captures = STEP_DIR.captures(name)?;
    let step = captures.get(1)?.as_str().parse().ok()?;
    Some(StepDir {
        name,
        step,
        encoder: captures.get(2).is_some(),
    })
}

/// Returns the directories to delete: every step directory whose step number
/// is not among the `keep` highest steps of the non-encoder directories.
/// Anything that is not a step directory is never selected.
pub fn select_for_removal<'a, I>(names: I, keep: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let dirs: Vec<StepDir<'a>> = names.into_iter().filter_map(parse_step_dir).collect();

    let steps: BTreeSet<u64> = dirs.iter().filter(|d| !d.encoder).map(|d| d.step).collect();
    let kept: BTreeSet<u64> = steps.into_iter().rev().take(keep).collect();

    let mut doomed: Vec<String> = dirs
        .into_iter()
        .filter(|d| !kept.contains(&d.step))
        .map(|d| d.name.to_string())
        .collect();
    doomed.sort();
    doomed
}
