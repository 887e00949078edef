//! Matchup win probabilities from event summaries.
//!
//! ESPN puts the matchup predictor in different places depending on the
//! sport and the age of the event. Each location is a [`ProbabilityStrategy`];
//! [`ProbabilityExtractor`] tries them in order.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct WinProbabilities {
    pub home: Option<f64>,
    pub away: Option<f64>,
}

impl WinProbabilities {
    fn from_pair(home: Option<f64>, away: Option<f64>) -> Option<Self> {
        (home.is_some() || away.is_some()).then_some(Self { home, away })
    }

    pub fn is_complete(&self) -> bool {
        self.home.is_some() && self.away.is_some()
    }
}

pub trait ProbabilityStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, summary: &Value) -> Option<WinProbabilities>;
}

fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().trim_end_matches('%').parse().ok()))
}

/// `probability` at the top level or under `game`.
pub struct SummaryProbability;

impl ProbabilityStrategy for SummaryProbability {
    fn name(&self) -> &'static str {
        "summary.probability"
    }

    fn extract(&self, summary: &Value) -> Option<WinProbabilities> {
        let block = [&summary["probability"], &summary["game"]["probability"]]
            .into_iter()
            .find(|block| block.as_object().is_some_and(|map| !map.is_empty()))?;

        if block.get("homeWinPercentage").is_some() {
            return WinProbabilities::from_pair(
                number(&block["homeWinPercentage"]),
                number(&block["awayWinPercentage"]),
            );
        }
        if block["home"].get("winningPercentage").is_some() {
            return WinProbabilities::from_pair(
                number(&block["home"]["winningPercentage"]),
                number(&block["away"]["winningPercentage"]),
            );
        }
        None
    }
}

/// `probability` or `probabilities` on one competition.
pub struct CompetitionProbability {
    pub competition_index: usize,
}

impl Default for CompetitionProbability {
    fn default() -> Self {
        Self { competition_index: 0 }
    }
}

impl ProbabilityStrategy for CompetitionProbability {
    fn name(&self) -> &'static str {
        "competitions.probability"
    }

    fn extract(&self, summary: &Value) -> Option<WinProbabilities> {
        let competition = summary["competitions"].get(self.competition_index)?;
        ["probability", "probabilities"]
            .iter()
            .filter_map(|key| competition.get(*key))
            .filter(|block| block["home"].is_object())
            .find_map(|block| {
                let side = |name: &str| {
                    number(&block[name]["winPct"]).or_else(|| number(&block[name]["winningPercentage"]))
                };
                WinProbabilities::from_pair(side("home"), side("away"))
            })
    }
}

/// Last resort: the first `homeWinPercentage` / `awayWinPercentage` anywhere
/// in the document, depth first.
pub struct KeySearch;

impl KeySearch {
    fn find(value: &Value, key: &str) -> Option<f64> {
        match value {
            Value::Object(map) => map
                .get(key)
                .and_then(number)
                .filter(|n| *n >= 0.0)
                .or_else(|| map.values().find_map(|child| Self::find(child, key))),
            Value::Array(items) => items.iter().find_map(|child| Self::find(child, key)),
            _ => None,
        }
    }
}

impl ProbabilityStrategy for KeySearch {
    fn name(&self) -> &'static str {
        "key-search"
    }

    fn extract(&self, summary: &Value) -> Option<WinProbabilities> {
        WinProbabilities::from_pair(
            Self::find(summary, "homeWinPercentage"),
            Self::find(summary, "awayWinPercentage"),
        )
    }
}

/// Ordered list of strategies. A complete pair wins immediately; otherwise
/// the first partial result is returned.
pub struct ProbabilityExtractor {
    strategies: Vec<Box<dyn ProbabilityStrategy>>,
}

impl Default for ProbabilityExtractor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SummaryProbability),
            Box::new(CompetitionProbability::default()),
            Box::new(KeySearch),
        ])
    }
}

impl ProbabilityExtractor {
    pub fn new(strategies: Vec<Box<dyn ProbabilityStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, summary: &Value) -> Option<WinProbabilities> {
        let mut partial = None;
        for strategy in &self.strategies {
            let Some(found) = strategy.extract(summary) else {
                continue;
            };
            if found.is_complete() {
                tracing::debug!(strategy = strategy.name(), "win probabilities found");
                return Some(found);
            }
            partial.get_or_insert(found);
        }
        partial
    }
}
