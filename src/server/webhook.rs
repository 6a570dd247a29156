//! Webhook ingress handlers

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::{
    core::{Provider, TriggerError},
    execution::SubmitOutcome,
    trigger::{parse_payload, verify},
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use tracing::{debug, info, warn};

pub const GITHUB_EVENT: &str = "x-github-event";
pub const GITLAB_EVENT: &str = "x-gitlab-event";
pub const GITEA_EVENT: &str = "x-gitea-event";
pub const HUB_SIGNATURE: &str = "x-hub-signature-256";
pub const GITEA_SIGNATURE: &str = "x-gitea-signature";
pub const GITLAB_TOKEN: &str = "x-gitlab-token";

/// Body of every 200 webhook response
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<SubmitOutcome>,
}

impl WebhookResponse {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            repository: None,
            branch: None,
            deployment: None,
        }
    }
}

/// POST /webhook
/// Provider detected from the request headers
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let provider = detect_provider(&headers).ok_or(TriggerError::UndetectedProvider)?;
    handle(state, provider, &headers, &body).await
}

/// POST /webhook/{provider}
pub async fn receive_for(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let provider: Provider = provider.parse()?;
    handle(state, provider, &headers, &body).await
}

async fn handle(
    state: AppState,
    provider: Provider,
    headers: &HeaderMap,
    body: &[u8],
) -> ApiResult<Json<WebhookResponse>> {
    let signature = signature_header(provider, headers);
    if !verify(provider, body, signature, state.secret.as_deref()) {
        warn!(provider = %provider, "Rejected webhook with invalid signature");
        return Err(ApiError::Unauthorized("Invalid signature".to_string()));
    }

    if let Some(event) = non_push_event(provider, headers) {
        debug!(provider = %provider, "Ignoring {} event", event);
        return Ok(Json(WebhookResponse::message(format!("Ignored {} event", event))));
    }

    let Some(trigger) = parse_payload(provider, body)? else {
        debug!(provider = %provider, "Ignoring non-push payload");
        return Ok(Json(WebhookResponse::message("Ignored non-push event")));
    };

    let Some(repository) = state.dispatch.resolve(&trigger) else {
        info!(
            provider = %provider,
            "No repository configured for {} on {}",
            trigger
                .repository_full_name
                .as_deref()
                .or(trigger.repository.as_deref())
                .unwrap_or("<unknown>"),
            trigger.branch
        );
        return Ok(Json(WebhookResponse {
            branch: Some(trigger.branch),
            repository: trigger.repository,
            ..WebhookResponse::message("No matching repository")
        }));
    };

    info!(
        repo = %repository.name,
        provider = %provider,
        pusher = trigger.pusher.as_deref().unwrap_or("unknown"),
        commit = trigger.short_commit().unwrap_or("-"),
        "Push received ({} commit(s))",
        trigger.commit_count
    );

    let outcome = state.scheduler.submit(repository.clone(), trigger).await;
    Ok(Json(WebhookResponse {
        repository: Some(repository.name.clone()),
        branch: Some(repository.branch.clone()),
        deployment: Some(outcome),
        ..WebhookResponse::message("Deployment triggered")
    }))
}

/// Guess the provider from its event headers.
///
/// Gitea also sends `X-GitHub-Event`, so it is checked first.
pub fn detect_provider(headers: &HeaderMap) -> Option<Provider> {
    if headers.contains_key(GITEA_EVENT) {
        Some(Provider::Gitea)
    } else if headers.contains_key(GITLAB_EVENT) || headers.contains_key(GITLAB_TOKEN) {
        Some(Provider::GitLab)
    } else if headers.contains_key(GITHUB_EVENT) {
        Some(Provider::GitHub)
    } else {
        None
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Header carrying the signature or token for `provider`
pub fn signature_header(provider: Provider, headers: &HeaderMap) -> Option<&str> {
    match provider {
        Provider::GitHub => header(headers, HUB_SIGNATURE),
        Provider::Gitea => header(headers, HUB_SIGNATURE).or_else(|| header(headers, GITEA_SIGNATURE)),
        Provider::GitLab => header(headers, GITLAB_TOKEN),
    }
}

/// The event name if the headers announce something other than a push.
///
/// GitLab is left to the payload's `object_kind`.
fn non_push_event(provider: Provider, headers: &HeaderMap) -> Option<String> {
    let event = match provider {
        Provider::GitHub => header(headers, GITHUB_EVENT),
        Provider::Gitea => header(headers, GITEA_EVENT),
        Provider::GitLab => None,
    }?;

    (!event.eq_ignore_ascii_case("push")).then(|| event.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_detect_provider() {
        assert_eq!(detect_provider(&headers(&[(GITHUB_EVENT, "push")])), Some(Provider::GitHub));
        assert_eq!(detect_provider(&headers(&[(GITLAB_TOKEN, "t")])), Some(Provider::GitLab));
        assert_eq!(
            detect_provider(&headers(&[(GITHUB_EVENT, "push"), (GITEA_EVENT, "push")])),
            Some(Provider::Gitea)
        );
        assert_eq!(detect_provider(&HeaderMap::new()), None);
    }

    #[test]
    fn test_gitea_signature_fallback() {
        let map = headers(&[(GITEA_SIGNATURE, "abc")]);
        assert_eq!(signature_header(Provider::Gitea, &map), Some("abc"));
        assert_eq!(signature_header(Provider::GitHub, &map), None);

        let both = headers(&[(GITEA_SIGNATURE, "abc"), (HUB_SIGNATURE, "sha256=def")]);
        assert_eq!(signature_header(Provider::Gitea, &both), Some("sha256=def"));
    }

    #[test]
    fn test_non_push_events() {
        assert_eq!(
            non_push_event(Provider::GitHub, &headers(&[(GITHUB_EVENT, "ping")])).as_deref(),
            Some("ping")
        );
        assert_eq!(non_push_event(Provider::GitHub, &headers(&[(GITHUB_EVENT, "push")])), None);
        assert_eq!(non_push_event(Provider::GitHub, &HeaderMap::new()), None);
        assert_eq!(non_push_event(Provider::GitLab, &headers(&[(GITLAB_EVENT, "Note Hook")])), None);
    }
}
