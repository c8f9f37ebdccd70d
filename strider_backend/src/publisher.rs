use chrono::Utc;

use crate::error::PublishFailure;
use crate::forum::{Destination, ForumPlatform, Receipt, Submission, TagOption};
use crate::transcript::Transcript;

/// Whether a platform rejection is about a missing or invalid category tag.
pub fn is_tag_rejection(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("flair")
        || lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == "tag" || word == "tags")
}

/// Preferred tags first, in preference order, then the rest as listed.
fn rank_tags(available: &[TagOption], preferred: &[String]) -> Vec<TagOption> {
    let mut ranked: Vec<TagOption> = preferred
        .iter()
        .filter_map(|want| {
            available
                .iter()
                .find(|tag| tag.text.trim().eq_ignore_ascii_case(want.trim()))
                .cloned()
        })
        .collect();
    for tag in available {
        if !ranked.iter().any(|r| r.id == tag.id) {
            ranked.push(tag.clone());
        }
    }
    ranked
}

pub struct Publisher {
    log: Option<Transcript>,
}

impl Publisher {
    pub fn new(log: Option<Transcript>) -> Self {
        Self { log }
    }

    /// Pick (and cache) the destination's tag. Listing failures mean "no tags".
    pub async fn resolve_tag(
        &self,
        forum: &dyn ForumPlatform,
        destination: &mut Destination,
    ) -> Option<TagOption> {
        if destination.tag.is_some() || destination.tags_resolved {
            return destination.tag.clone();
        }

        let available = match forum.available_tags(&destination.name).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!(
                    "Tag listing for r/{} unavailable, posting without tag: {:#}",
                    destination.name,
                    e
                );
                Vec::new()
            }
        };

        destination.tag = rank_tags(&available, &destination.preferred_tags)
            .into_iter()
            .next();
        destination.available_tags = available;
        destination.tags_resolved = true;

        if let Some(tag) = &destination.tag {
            tracing::debug!("Resolved tag '{}' for r/{}", tag.text, destination.name);
        }
        destination.tag.clone()
    }

    pub async fn publish(
        &self,
        forum: &dyn ForumPlatform,
        destination: &mut Destination,
        title: &str,
        body: &str,
    ) -> Result<Receipt, PublishFailure> {
        let tag = self.resolve_tag(forum, destination).await;
        let mut submission = Submission {
            title: title.to_string(),
            body: body.to_string(),
            tag: tag.clone(),
        };

        let first_error = match forum.submit_item(&destination.name, &submission).await {
            Ok(receipt) => {
                self.record(destination, title, body);
                return Ok(receipt);
            }
            Err(e) => format!("{e:#}"),
        };

        let alternatives: Vec<TagOption> =
            rank_tags(&destination.available_tags, &destination.preferred_tags)
                .into_iter()
                .filter(|candidate| tag.as_ref().map_or(true, |t| t.id != candidate.id))
                .collect();

        if !is_tag_rejection(&first_error) || alternatives.is_empty() {
            return Err(PublishFailure::Rejected {
                destination: destination.name.clone(),
                message: first_error,
            });
        }

        tracing::warn!(
            "r/{} rejected the tag ({}), trying {} alternatives",
            destination.name,
            first_error,
            alternatives.len()
        );

        let attempts = alternatives.len();
        let mut last_error = first_error;
        for candidate in alternatives {
            submission.tag = Some(candidate.clone());
            match forum.submit_item(&destination.name, &submission).await {
                Ok(receipt) => {
                    tracing::info!(
                        "r/{} accepted tag '{}', caching it",
                        destination.name,
                        candidate.text
                    );
                    destination.tag = Some(candidate);
                    self.record(destination, title, body);
                    return Ok(receipt);
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    tracing::debug!(
                        "r/{} rejected tag '{}': {}",
                        destination.name,
                        candidate.text,
                        last_error
                    );
                }
            }
        }

        Err(PublishFailure::TagRetriesExhausted {
            destination: destination.name.clone(),
            attempts,
            last: last_error,
        })
    }

    fn record(&self, destination: &Destination, title: &str, body: &str) {
        if let Some(log) = &self.log {
            log.append_best_effort(
                Utc::now(),
                &format!("r/{}", destination.name),
                &[("Title", title), ("Body", body)],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::fake::{tag, FakeForum};

    const FLAIR_REQUIRED: &str =
        "submit rejected: SUBMIT_VALIDATION_FLAIR_REQUIRED: Your post must contain post flair.";

    fn forum_with_tags(tags: Vec<TagOption>) -> FakeForum {
        let mut forum = FakeForum::default();
        forum.tags.insert("running".to_string(), Ok(tags));
        forum
    }

    #[test]
    fn tag_rejection_detection() {
        assert!(is_tag_rejection(FLAIR_REQUIRED));
        assert!(is_tag_rejection("invalid tag id"));
        assert!(!is_tag_rejection("RATELIMIT: you are doing that too much"));
        assert!(!is_tag_rejection("post is at an early stage"));
    }

    #[test]
    fn ranks_preferred_tags_first() {
        let available = vec![tag("1", "Misc"), tag("2", "Training"), tag("3", "Race Report")];
        let ranked = rank_tags(&available, &["race report".to_string(), "Nope".to_string()]);
        let ids: Vec<&str> = ranked.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[tokio::test]
    async fn resolves_preferred_tag_once() {
        let forum = forum_with_tags(vec![tag("1", "Misc"), tag("2", "Training")]);
        let publisher = Publisher::new(None);
        let mut dest = Destination::new("running", vec!["Training".to_string()]);

        let first = publisher.resolve_tag(&forum, &mut dest).await;
        let second = publisher.resolve_tag(&forum, &mut dest).await;
        assert_eq!(first.map(|t| t.id), Some("2".to_string()));
        assert_eq!(second.map(|t| t.id), Some("2".to_string()));
        assert_eq!(*forum.tag_queries.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn permission_error_posts_without_tag() {
        let mut forum = FakeForum::default();
        forum.tags.insert(
            "running".to_string(),
            Err("permission denied (403) for /r/running/api/link_flair_v2".to_string()),
        );
        let publisher = Publisher::new(None);
        let mut dest = Destination::new("running", Vec::new());

        publisher
            .publish(&forum, &mut dest, "Day 1", "Started!")
            .await
            .expect("published");
        assert_eq!(forum.submitted_tags(), vec![None]);
    }

    #[tokio::test]
    async fn retries_alternatives_until_success() {
        let forum = forum_with_tags(vec![tag("1", "Misc"), tag("2", "Training"), tag("3", "Gear")])
            .script_submits(vec![
                Err(FLAIR_REQUIRED.to_string()),
                Err(FLAIR_REQUIRED.to_string()),
                Ok(()),
            ]);
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("posts.txt");
        let publisher = Publisher::new(Some(Transcript::new(&log_path)));
        let mut dest = Destination::new("running", Vec::new());

        let receipt = publisher
            .publish(&forum, &mut dest, "Day 3", "Sore legs")
            .await
            .expect("published");

        assert_eq!(receipt.id, "t3_post3");
        assert_eq!(
            forum.submitted_tags(),
            vec![
                Some("Misc".to_string()),
                Some("Training".to_string()),
                Some("Gear".to_string())
            ]
        );
        assert_eq!(dest.tag.map(|t| t.text), Some("Gear".to_string()));
        let log = std::fs::read_to_string(&log_path).expect("log");
        assert!(log.contains("r/running"));
        assert!(log.contains("Title: Day 3"));
    }

    #[tokio::test]
    async fn exhausted_alternatives_surface_last_error() {
        let forum = forum_with_tags(vec![tag("1", "Misc"), tag("2", "Training")]).script_submits(
            vec![
                Err(FLAIR_REQUIRED.to_string()),
                Err("flair not allowed for this post".to_string()),
            ],
        );
        let publisher = Publisher::new(None);
        let mut dest = Destination::new("running", Vec::new());

        let err = publisher
            .publish(&forum, &mut dest, "t", "b")
            .await
            .expect_err("fails");
        match err {
            PublishFailure::TagRetriesExhausted { attempts, last, .. } => {
                assert_eq!(attempts, 1);
                assert!(last.contains("not allowed"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_tag_rejection_is_not_retried() {
        let forum = forum_with_tags(vec![tag("1", "Misc"), tag("2", "Training")])
            .script_submits(vec![Err("RATELIMIT: try again in 9 minutes".to_string())]);
        let publisher = Publisher::new(None);
        let mut dest = Destination::new("running", Vec::new());

        let err = publisher
            .publish(&forum, &mut dest, "t", "b")
            .await
            .expect_err("fails");
        assert!(matches!(err, PublishFailure::Rejected { .. }));
        assert_eq!(forum.submissions.lock().unwrap().len(), 1);
    }
}
