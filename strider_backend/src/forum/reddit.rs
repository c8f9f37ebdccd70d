use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{ForumPlatform, ItemSummary, ListingOrder, Receipt, Submission, TagOption, UserInfo};
use crate::config::Credentials;
use crate::error::AuthError;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

// ========================================================================
// Reddit API Types
// ========================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RulesResponse {
    #[serde(default)]
    rules: Vec<RuleView>,
}

#[derive(Debug, Deserialize)]
struct RuleView {
    #[serde(default)]
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlairView {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing<LinkView>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct LinkView {
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    stickied: bool,
}

#[derive(Debug, Deserialize)]
struct JsonEnvelope<T> {
    json: JsonBody<T>,
}

#[derive(Debug, Deserialize)]
struct JsonBody<T> {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    #[serde(default)]
    things: Vec<Thing<CommentView>>,
}

#[derive(Debug, Deserialize)]
struct CommentView {
    name: String,
    #[serde(default)]
    permalink: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

// ========================================================================
// Reddit Client
// ========================================================================

pub struct RedditClient {
    client: Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    /// `client` should already carry the configured user agent.
    pub fn new(client: Client, credentials: &Credentials) -> Self {
        Self {
            client,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            refresh_token: credentials.refresh_token.clone(),
            token: Mutex::new(None),
        }
    }

    /// Exchange the refresh token and confirm the account. Startup calls this once.
    pub async fn authenticate(&self) -> Result<UserInfo, AuthError> {
        self.bearer().await?;
        let me: MeResponse = self
            .get_json("/api/v1/me", &[])
            .await
            .map_err(|e| AuthError::Transport(format!("{e:#}")))?;
        Ok(UserInfo { name: me.name })
    }

    async fn refresh_access_token(&self) -> Result<AccessToken, AuthError> {
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Transport(format!("unreadable token response: {e}")))?;
        match (parsed.access_token, parsed.error) {
            (Some(value), None) => {
                let expires_in = parsed.expires_in.unwrap_or(3600);
                tracing::debug!("Refreshed Reddit access token (expires in {}s)", expires_in);
                Ok(AccessToken {
                    value,
                    expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
                })
            }
            (_, error) => Err(AuthError::Rejected {
                status: status.as_u16(),
                body: error.unwrap_or(body),
            }),
        }
    }

    async fn bearer(&self) -> Result<String, AuthError> {
        let mut guard = self.token.lock().await;
        let fresh_enough = guard.as_ref().is_some_and(|token| {
            token.expires_at - Utc::now() > ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS)
        });
        if !fresh_enough {
            *guard = Some(self.refresh_access_token().await?);
        }
        guard
            .as_ref()
            .map(|token| token.value.clone())
            .ok_or_else(|| AuthError::Transport("no access token".to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let token = self.bearer().await?;
        let url = format!("{API_BASE}{path}");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("raw_json", "1")])
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        read_json(response, path).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T> {
        let token = self.bearer().await?;
        let url = format!("{API_BASE}{path}");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .form(form)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?;
        read_json(response, path).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T> {
    let status = response.status();
    if status == StatusCode::FORBIDDEN {
        anyhow::bail!("permission denied (403) for {}", path);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} returned {}: {}", path, status, body);
    }
    response
        .json()
        .await
        .with_context(|| format!("Failed to parse response from {path}"))
}

/// Flatten Reddit's `[[CODE, message, field], ...]` error list.
fn format_api_errors(errors: &[Vec<serde_json::Value>]) -> String {
    errors
        .iter()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.as_str())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(": ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn unwrap_envelope<T>(envelope: JsonEnvelope<T>, action: &str) -> Result<T> {
    if !envelope.json.errors.is_empty() {
        anyhow::bail!("{} rejected: {}", action, format_api_errors(&envelope.json.errors));
    }
    envelope
        .json
        .data
        .with_context(|| format!("{action} returned no data"))
}

#[async_trait]
impl ForumPlatform for RedditClient {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn current_user(&self) -> Result<UserInfo> {
        let me: MeResponse = self.get_json("/api/v1/me", &[]).await?;
        Ok(UserInfo { name: me.name })
    }

    async fn destination_rules(&self, destination: &str) -> Result<Vec<String>> {
        let rules: RulesResponse = self
            .get_json(&format!("/r/{destination}/about/rules"), &[])
            .await?;
        Ok(rules
            .rules
            .into_iter()
            .filter_map(|rule| rule.short_name)
            .filter(|name| !name.trim().is_empty())
            .collect())
    }

    async fn available_tags(&self, destination: &str) -> Result<Vec<TagOption>> {
        let flairs: Vec<FlairView> = self
            .get_json(&format!("/r/{destination}/api/link_flair_v2"), &[])
            .await?;
        Ok(flairs
            .into_iter()
            .filter_map(|flair| match (flair.id, flair.text) {
                (Some(id), Some(text)) if !id.is_empty() => Some(TagOption { id, text }),
                _ => None,
            })
            .collect())
    }

    async fn list_items(
        &self,
        destination: &str,
        order: ListingOrder,
        limit: usize,
    ) -> Result<Vec<ItemSummary>> {
        let listing: Listing = self
            .get_json(
                &format!("/r/{destination}/{}", order.as_str()),
                &[("limit", limit.to_string())],
            )
            .await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .filter(|link| !link.stickied)
            .map(|link| ItemSummary {
                id: link.name,
                title: link.title,
                body: link.selftext,
                score: link.score,
                author: link.author,
            })
            .collect())
    }

    async fn submit_item(&self, destination: &str, submission: &Submission) -> Result<Receipt> {
        let mut form = vec![
            ("api_type", "json".to_string()),
            ("kind", "self".to_string()),
            ("sr", destination.to_string()),
            ("title", submission.title.clone()),
            ("text", submission.body.clone()),
        ];
        if let Some(tag) = &submission.tag {
            form.push(("flair_id", tag.id.clone()));
            form.push(("flair_text", tag.text.clone()));
        }

        let envelope: JsonEnvelope<SubmitData> = self.post_form("/api/submit", &form).await?;
        let data = unwrap_envelope(envelope, "submit")?;
        let id = data
            .name
            .or(data.id)
            .context("submit returned no post id")?;
        Ok(Receipt { id, url: data.url })
    }

    async fn reply_to_item(&self, item_id: &str, text: &str) -> Result<Receipt> {
        let form = [
            ("api_type", "json".to_string()),
            ("thing_id", item_id.to_string()),
            ("text", text.to_string()),
        ];
        let envelope: JsonEnvelope<CommentData> = self.post_form("/api/comment", &form).await?;
        let data = unwrap_envelope(envelope, "comment")?;
        let comment = data
            .things
            .into_iter()
            .next()
            .context("comment returned no thing")?
            .data;
        Ok(Receipt {
            id: comment.name,
            url: comment
                .permalink
                .map(|link| format!("https://www.reddit.com{link}")),
        })
    }
}
