//! Normalize provider push payloads into a [`DeploymentTrigger`]

use crate::core::{DeploymentTrigger, Provider, TriggerError, TriggerSource};
use chrono::Utc;
use serde_json::Value;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Parse a raw webhook body.
///
/// Invalid JSON is an error; a valid payload that is not a push yields `None`.
pub fn parse_payload(provider: Provider, body: &[u8]) -> Result<Option<DeploymentTrigger>, TriggerError> {
    let payload: Value = serde_json::from_slice(body)?;
    Ok(normalize(provider, &payload))
}

/// Turn a decoded payload into a trigger, or `None` for non-push events.
///
/// Missing fields become `None`/zero rather than errors.
pub fn normalize(provider: Provider, payload: &Value) -> Option<DeploymentTrigger> {
    match provider {
        Provider::GitHub => github(payload),
        Provider::GitLab => gitlab(payload),
        Provider::Gitea => gitea(payload),
    }
}

/// Strip `refs/heads/` from a ref. Other refs (tags) pass through unchanged.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref)
}

fn github(payload: &Value) -> Option<DeploymentTrigger> {
    let git_ref = str_at(payload, &["ref"])?;

    Some(DeploymentTrigger {
        source: TriggerSource::Webhook(Provider::GitHub),
        branch: branch_from_ref(git_ref).to_string(),
        repository: owned(str_at(payload, &["repository", "name"])),
        repository_full_name: owned(str_at(payload, &["repository", "full_name"])),
        pusher: owned(str_at(payload, &["pusher", "name"]).or_else(|| str_at(payload, &["sender", "login"]))),
        commit_count: array_len(payload, "commits"),
        head_commit: owned(str_at(payload, &["head_commit", "id"]).or_else(|| str_at(payload, &["after"]))),
        received_at: Utc::now(),
    })
}

fn gitlab(payload: &Value) -> Option<DeploymentTrigger> {
    match str_at(payload, &["object_kind"]) {
        Some("push") | Some("tag_push") | None => {}
        Some(_) => return None,
    }
    let git_ref = str_at(payload, &["ref"])?;

    let commit_count = payload
        .get("total_commits_count")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or_else(|| array_len(payload, "commits"));

    Some(DeploymentTrigger {
        source: TriggerSource::Webhook(Provider::GitLab),
        branch: branch_from_ref(git_ref).to_string(),
        repository: owned(str_at(payload, &["project", "name"]).or_else(|| str_at(payload, &["repository", "name"]))),
        repository_full_name: owned(str_at(payload, &["project", "path_with_namespace"])),
        pusher: owned(str_at(payload, &["user_username"]).or_else(|| str_at(payload, &["user_name"]))),
        commit_count,
        head_commit: owned(str_at(payload, &["checkout_sha"]).or_else(|| str_at(payload, &["after"]))),
        received_at: Utc::now(),
    })
}

fn gitea(payload: &Value) -> Option<DeploymentTrigger> {
    let git_ref = str_at(payload, &["ref"])?;

    let pusher = str_at(payload, &["pusher", "login"])
        .or_else(|| str_at(payload, &["pusher", "username"]))
        .or_else(|| str_at(payload, &["pusher", "full_name"]));

    Some(DeploymentTrigger {
        source: TriggerSource::Webhook(Provider::Gitea),
        branch: branch_from_ref(git_ref).to_string(),
        repository: owned(str_at(payload, &["repository", "name"])),
        repository_full_name: owned(str_at(payload, &["repository", "full_name"])),
        pusher: owned(pusher),
        commit_count: array_len(payload, "commits"),
        head_commit: owned(str_at(payload, &["after"]).or_else(|| str_at(payload, &["head_commit", "id"]))),
        received_at: Utc::now(),
    })
}

/// Walk nested object keys and return a string leaf
fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(*key))
        .and_then(Value::as_str)
}

fn array_len(value: &Value, key: &str) -> usize {
    value.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}
