use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{AgentConfig, DestinationConfig};
use crate::error::DiscoveryFailure;
use crate::forum::{ForumPlatform, ItemSummary, ListingOrder};
use crate::rate_gate::RateGateState;

const HIGH_VALUE_ORDERS: [ListingOrder; 3] =
    [ListingOrder::Hot, ListingOrder::Rising, ListingOrder::New];

#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub name: String,
    pub weight: u32,
    pub high_value: bool,
}

impl From<&DestinationConfig> for ScanTarget {
    fn from(config: &DestinationConfig) -> Self {
        Self {
            name: config.name.clone(),
            weight: config.weight,
            high_value: config.high_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedItem {
    pub destination: String,
    pub item: ItemSummary,
}

pub struct DiscoveryScanner {
    targets: Vec<ScanTarget>,
    keywords: Vec<String>,
    score_threshold: i64,
    high_value_limit: usize,
    keyword_limit: usize,
}

impl DiscoveryScanner {
    pub fn new(
        targets: Vec<ScanTarget>,
        keywords: &[String],
        score_threshold: i64,
        high_value_limit: usize,
        keyword_limit: usize,
    ) -> Self {
        Self {
            targets,
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            score_threshold,
            high_value_limit,
            keyword_limit,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config
                .destinations
                .iter()
                .filter(|d| d.comment_target)
                .map(ScanTarget::from)
                .collect(),
            &config.keywords,
            config.high_value_score_threshold,
            config.high_value_listing_limit,
            config.keyword_listing_limit,
        )
    }

    pub fn matches_keywords(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.keywords.iter().any(|k| title.contains(k.as_str()))
    }

    /// Weighted draw over targets with a positive weight.
    pub fn choose_target<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&ScanTarget> {
        let eligible: Vec<&ScanTarget> = self.targets.iter().filter(|t| t.weight > 0).collect();
        let dist = WeightedIndex::new(eligible.iter().map(|t| t.weight)).ok()?;
        Some(eligible[dist.sample(rng)])
    }

    /// At most one unseen, relevant item from one destination. `None` is a normal outcome.
    pub async fn select_candidate<R: Rng + ?Sized>(
        &self,
        forum: &dyn ForumPlatform,
        gate: &RateGateState,
        rng: &mut R,
    ) -> Option<SelectedItem> {
        let target = self.choose_target(rng)?.clone();

        let item = if target.high_value {
            let mut items = self.gather_high_value(forum, &target.name).await;
            items.shuffle(rng);
            tracing::debug!(
                "Scanning {} items from r/{} (score > {})",
                items.len(),
                target.name,
                self.score_threshold
            );
            items
                .into_iter()
                .find(|item| !gate.has_seen(&item.id) && item.score > self.score_threshold)
        } else {
            let items = self
                .list(forum, &target.name, ListingOrder::New, self.keyword_limit)
                .await
                .unwrap_or_default();
            tracing::debug!(
                "Scanning {} new items from r/{} for keywords",
                items.len(),
                target.name
            );
            items
                .into_iter()
                .find(|item| !gate.has_seen(&item.id) && self.matches_keywords(&item.title))
        };

        match item {
            Some(item) => Some(SelectedItem {
                destination: target.name,
                item,
            }),
            None => {
                tracing::debug!("No qualifying item in r/{}", target.name);
                None
            }
        }
    }

    async fn gather_high_value(&self, forum: &dyn ForumPlatform, name: &str) -> Vec<ItemSummary> {
        let mut merged: Vec<ItemSummary> = Vec::new();
        for order in HIGH_VALUE_ORDERS {
            let Some(batch) = self.list(forum, name, order, self.high_value_limit).await else {
                continue;
            };
            for item in batch {
                if !merged.iter().any(|existing| existing.id == item.id) {
                    merged.push(item);
                }
            }
        }
        merged
    }

    async fn list(
        &self,
        forum: &dyn ForumPlatform,
        name: &str,
        order: ListingOrder,
        limit: usize,
    ) -> Option<Vec<ItemSummary>> {
        match forum.list_items(name, order, limit).await {
            Ok(items) => Some(items),
            Err(e) => {
                let failure = DiscoveryFailure::Listing {
                    destination: name.to_string(),
                    order: order.as_str(),
                    message: format!("{e:#}"),
                };
                tracing::warn!("{}", failure);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::fake::{item, FakeForum};
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gate() -> RateGateState {
        RateGateState::new(NaiveDate::from_ymd_opt(2026, 5, 4).expect("date"))
    }

    fn target(name: &str, weight: u32, high_value: bool) -> ScanTarget {
        ScanTarget {
            name: name.to_string(),
            weight,
            high_value,
        }
    }

    fn scanner(targets: Vec<ScanTarget>) -> DiscoveryScanner {
        DiscoveryScanner::new(
            targets,
            &["marathon".to_string(), "C25K".to_string()],
            10,
            10,
            25,
        )
    }

    #[test]
    fn zero_weights_are_never_chosen() {
        let scanner = scanner(vec![target("skip", 0, false), target("pick", 3, false)]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(scanner.choose_target(&mut rng).map(|t| t.name.as_str()), Some("pick"));
        }
        assert!(scanner_with_no_weight().choose_target(&mut rng).is_none());
    }

    fn scanner_with_no_weight() -> DiscoveryScanner {
        scanner(vec![target("a", 0, false)])
    }

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let scanner = scanner(Vec::new());
        assert!(scanner.matches_keywords("First MARATHON next month"));
        assert!(scanner.matches_keywords("c25k week 2"));
        assert!(!scanner.matches_keywords("Favourite pasta recipes"));
    }

    #[tokio::test]
    async fn keyword_destination_skips_seen_and_irrelevant() {
        let forum = FakeForum::default().with_listing(
            "C25K",
            ListingOrder::New,
            vec![
                item("t3_seen", "C25K week 1 done", 1),
                item("t3_off", "Shoe lace colours", 50),
                item("t3_hit", "Marathon dreams after c25k", 0),
            ],
        );
        let scanner = scanner(vec![target("C25K", 1, false)]);
        let mut gate = gate();
        gate.mark_seen("t3_seen");
        let mut rng = StdRng::seed_from_u64(1);

        let selected = scanner
            .select_candidate(&forum, &gate, &mut rng)
            .await
            .expect("candidate");
        assert_eq!(selected.destination, "C25K");
        assert_eq!(selected.item.id, "t3_hit");
    }

    #[tokio::test]
    async fn high_value_applies_score_threshold_across_listings() {
        let forum = FakeForum::default()
            .with_listing("running", ListingOrder::Hot, vec![item("t3_low", "Any title", 3)])
            .with_listing("running", ListingOrder::Rising, vec![item("t3_low", "Any title", 3)])
            .with_listing("running", ListingOrder::New, vec![item("t3_big", "Race day", 42)]);
        let scanner = scanner(vec![target("running", 1, true)]);
        let mut rng = StdRng::seed_from_u64(3);

        let selected = scanner
            .select_candidate(&forum, &gate(), &mut rng)
            .await
            .expect("candidate");
        assert_eq!(selected.item.id, "t3_big");
    }

    #[tokio::test]
    async fn nothing_qualifying_is_none() {
        let mut forum = FakeForum::default()
            .with_listing("running", ListingOrder::Hot, vec![item("t3_low", "Any", 2)]);
        forum.listings.insert(
            ("running".to_string(), "rising"),
            Err("503 Service Unavailable".to_string()),
        );
        let scanner = scanner(vec![target("running", 1, true)]);
        let mut rng = StdRng::seed_from_u64(9);

        assert!(scanner
            .select_candidate(&forum, &gate(), &mut rng)
            .await
            .is_none());
    }
}
