pub mod reddit;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::DestinationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOrder {
    Hot,
    Rising,
    New,
}

impl ListingOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingOrder::Hot => "hot",
            ListingOrder::Rising => "rising",
            ListingOrder::New => "new",
        }
    }
}

/// A listed item (thread) inside a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    /// Platform-wide identifier used for replies and dedup.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub title: String,
    pub body: String,
    pub tag: Option<TagOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserInfo {
    pub name: String,
}

/// A named target community, with per-run caches of its tag choice and rules.
#[derive(Debug, Clone)]
pub struct Destination {
    pub name: String,
    pub preferred_tags: Vec<String>,
    /// Cached tag once resolved (lazily, on first publish).
    pub tag: Option<TagOption>,
    /// Tags the platform offered when last asked; empty if none or not permitted.
    pub available_tags: Vec<TagOption>,
    pub tags_resolved: bool,
    pub rules: Vec<String>,
    pub rules_loaded: bool,
}

impl Destination {
    pub fn new(name: &str, preferred_tags: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            preferred_tags,
            tag: None,
            available_tags: Vec::new(),
            tags_resolved: false,
            rules: Vec::new(),
            rules_loaded: false,
        }
    }
}

impl From<&DestinationConfig> for Destination {
    fn from(config: &DestinationConfig) -> Self {
        Destination::new(&config.name, config.preferred_tags.clone())
    }
}

/// The operations the agent needs from a discussion platform.
#[async_trait]
pub trait ForumPlatform: Send + Sync {
    fn name(&self) -> &str;

    async fn current_user(&self) -> Result<UserInfo>;

    /// Short rule titles for a destination.
    async fn destination_rules(&self, destination: &str) -> Result<Vec<String>>;

    async fn available_tags(&self, destination: &str) -> Result<Vec<TagOption>>;

    async fn list_items(
        &self,
        destination: &str,
        order: ListingOrder,
        limit: usize,
    ) -> Result<Vec<ItemSummary>>;

    async fn submit_item(&self, destination: &str, submission: &Submission) -> Result<Receipt>;

    async fn reply_to_item(&self, item_id: &str, text: &str) -> Result<Receipt>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// In-memory platform. Submit outcomes are scripted per call; listings are fixed.
    #[derive(Default)]
    pub struct FakeForum {
        pub user_error: Option<String>,
        /// Makes `current_user` panic instead of returning.
        pub user_panics: bool,
        pub user_calls: Mutex<usize>,
        pub tags: HashMap<String, Result<Vec<TagOption>, String>>,
        pub rules: HashMap<String, Vec<String>>,
        pub listings: HashMap<(String, &'static str), Result<Vec<ItemSummary>, String>>,
        pub submit_outcomes: Mutex<VecDeque<Result<(), String>>>,
        pub submissions: Mutex<Vec<(String, Submission)>>,
        pub replies: Mutex<Vec<(String, String)>>,
        pub tag_queries: Mutex<usize>,
    }

    impl FakeForum {
        pub fn with_listing(
            mut self,
            destination: &str,
            order: ListingOrder,
            items: Vec<ItemSummary>,
        ) -> Self {
            self.listings
                .insert((destination.to_string(), order.as_str()), Ok(items));
            self
        }

        pub fn script_submits(self, outcomes: Vec<Result<(), String>>) -> Self {
            *self.submit_outcomes.lock().unwrap() = outcomes.into();
            self
        }

        pub fn submitted_tags(&self) -> Vec<Option<String>> {
            self.submissions
                .lock()
                .unwrap()
                .iter()
                .map(|(_, s)| s.tag.as_ref().map(|t| t.text.clone()))
                .collect()
        }
    }

    pub fn item(id: &str, title: &str, score: i64) -> ItemSummary {
        ItemSummary {
            id: id.to_string(),
            title: title.to_string(),
            body: format!("{title} body"),
            score,
            author: Some("someone".to_string()),
        }
    }

    pub fn tag(id: &str, text: &str) -> TagOption {
        TagOption {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[async_trait]
    impl ForumPlatform for FakeForum {
        fn name(&self) -> &str {
            "fake"
        }

        async fn current_user(&self) -> Result<UserInfo> {
            *self.user_calls.lock().unwrap() += 1;
            if self.user_panics {
                panic!("session state corrupted");
            }
            match &self.user_error {
                Some(e) => anyhow::bail!("{e}"),
                None => Ok(UserInfo {
                    name: "strider_bot".to_string(),
                }),
            }
        }

        async fn destination_rules(&self, destination: &str) -> Result<Vec<String>> {
            Ok(self.rules.get(destination).cloned().unwrap_or_default())
        }

        async fn available_tags(&self, destination: &str) -> Result<Vec<TagOption>> {
            *self.tag_queries.lock().unwrap() += 1;
            match self.tags.get(destination) {
                Some(Ok(tags)) => Ok(tags.clone()),
                Some(Err(e)) => anyhow::bail!("{e}"),
                None => Ok(Vec::new()),
            }
        }

        async fn list_items(
            &self,
            destination: &str,
            order: ListingOrder,
            limit: usize,
        ) -> Result<Vec<ItemSummary>> {
            match self.listings.get(&(destination.to_string(), order.as_str())) {
                Some(Ok(items)) => Ok(items.iter().take(limit).cloned().collect()),
                Some(Err(e)) => anyhow::bail!("{e}"),
                None => Ok(Vec::new()),
            }
        }

        async fn submit_item(&self, destination: &str, submission: &Submission) -> Result<Receipt> {
            self.submissions
                .lock()
                .unwrap()
                .push((destination.to_string(), submission.clone()));
            let outcome = self
                .submit_outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()));
            match outcome {
                Ok(()) => {
                    let n = self.submissions.lock().unwrap().len();
                    Ok(Receipt {
                        id: format!("t3_post{n}"),
                        url: Some(format!("https://example.test/r/{destination}/{n}")),
                    })
                }
                Err(e) => anyhow::bail!("{e}"),
            }
        }

        async fn reply_to_item(&self, item_id: &str, text: &str) -> Result<Receipt> {
            let mut replies = self.replies.lock().unwrap();
            replies.push((item_id.to_string(), text.to_string()));
            Ok(Receipt {
                id: format!("t1_reply{}", replies.len()),
                url: None,
            })
        }
    }
}
