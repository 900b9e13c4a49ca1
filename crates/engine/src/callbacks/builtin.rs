//! Callbacks shipped with the engine.
//!
//! They support the code-block tracing workflow: locating the commit whose
//! diff introduced a given Java snippet.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use retriever_util::{added_lines, normalize_java};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::CallbackRegistry;
use crate::entity::Entity;
use crate::error::CallbackError;

pub const VALIDATE_CODE_BLOCK_NORMALIZATION: &str = "validate_code_block_normalization";
pub const SORT_COMMITS: &str = "sort_commits";
pub const FILTER_PATCHES_WITH_CODE_BLOCK: &str = "filter_patches_with_code_block";

pub(super) fn register(registry: &mut CallbackRegistry) {
    registry
        .register_entity_hook(VALIDATE_CODE_BLOCK_NORMALIZATION, validate_code_block_normalization)
        .register_entity_hook(SORT_COMMITS, sort_commits)
        .register_entity_hook(FILTER_PATCHES_WITH_CODE_BLOCK, filter_patches_with_code_block);
}

fn required_input<'a>(entity: &'a Entity, name: &str) -> Result<&'a str, CallbackError> {
    entity
        .input(name)
        .ok_or_else(|| CallbackError::MissingParameter(name.to_string()))
}

/// Check that normalizing `code_block` reproduces `code_block_normalized`.
fn validate_code_block_normalization(entity: &mut Entity) -> Result<bool, CallbackError> {
    let code_block = required_input(entity, "code_block")?;
    let expected = required_input(entity, "code_block_normalized")?;

    if normalize_java(code_block) == expected {
        info!("normalization successfully validated");
    } else {
        error!("validation of normalization failed");
    }
    Ok(true)
}

/// Sort the `commits` records by `commit_date`, oldest first.
fn sort_commits(entity: &mut Entity) -> Result<bool, CallbackError> {
    let Some(Value::Array(commits)) = entity.output_mut("commits") else {
        debug!("no commits to sort");
        return Ok(true);
    };

    let mut dates = Vec::with_capacity(commits.len());
    for commit in commits.iter() {
        let raw = commit.get("commit_date").and_then(Value::as_str);
        match raw.and_then(parse_commit_date) {
            Some(date) => dates.push(date),
            None => {
                warn!(commit_date = ?raw, "unparseable commit date; commits left in response order");
                return Ok(true);
            }
        }
    }

    let mut dated = dates.into_iter().zip(commits.drain(..)).collect::<Vec<_>>();
    dated.sort_by_key(|(date, _)| *date);

    commits.extend(dated.into_iter().map(|(date, mut commit)| {
        if let Some(record) = commit.as_object_mut() {
            record.insert("commit_date".to_string(), Value::String(date.to_rfc3339()));
        }
        commit
    }));
    Ok(true)
}

fn parse_commit_date(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%:z"))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc().fixed_offset())
        })
}

/// Keep the entity only if the patch of the file at `path` adds the
/// normalized code block. On a match the patch is stored in `commit_diff`
/// and `commit_diff_normalized` and the bulky `files` value is dropped.
fn filter_patches_with_code_block(entity: &mut Entity) -> Result<bool, CallbackError> {
    let path = required_input(entity, "path")?.to_string();
    let code_block = required_input(entity, "code_block_normalized")?.to_string();

    let Some(Value::Array(files)) = entity.output("files") else {
        debug!("no files in response");
        return Ok(false);
    };

    let matching_patch = files
        .iter()
        .filter(|file| file.get("filename").and_then(Value::as_str) == Some(path.as_str()))
        .filter_map(|file| file.get("patch").and_then(Value::as_str))
        .filter(|patch| !patch.is_empty())
        .find_map(|patch| {
            let normalized = normalize_java(&added_lines(patch));
            normalized.contains(&code_block).then(|| (patch.to_string(), normalized))
        });

    let Some((patch, normalized)) = matching_patch else {
        debug!(path = %path, "code block not found in any patch");
        return Ok(false);
    };

    entity.set_output("commit_diff", Value::String(patch));
    entity.set_output("commit_diff_normalized", Value::String(normalized));
    entity.take_output("files");
    Ok(true)
}
