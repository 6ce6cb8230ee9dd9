//! Canonical KPI selection
//!
//! Recordings expose dozens of RSRP-like signals (per carrier, per neighbour, per
//! layer). For each KPI family the selector gathers every catalog name matching the
//! family's patterns and ranks them: candidates with data first, then by a qualifier
//! score that sample volume dominates, then by sample count and name.

use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::models::{KpiSelection, KpiType, MetricCatalogEntry, MissingKpi};

const SAMPLE_SCORE_CAP: usize = 1000;
pub const REASON_NO_SAMPLES: &str = "exists but 0 decoded samples";
pub const REASON_NOT_DECLARED: &str = "not found in declarations";

const TP: &str = "(throughput|tput|bitrate)";

/// Candidate patterns for one KPI family, most specific first
struct FamilyPatterns {
    specific: Vec<String>,
    /// Last resort keyword; names also matching `opposite` are not candidates through it
    bare: &'static str,
    opposite: Option<String>,
}

/// Direction qualifier for `ul`/`dl`, tolerant of `Dl.Throughput`, `DL_Tput` and
/// camelCase `DlThroughput`/`ThroughputDl` spellings.
fn direction(word: &str, short: &str) -> String {
    format!(r"{word}|\b{short}(\b|_|{TP})|{TP}{short}\b")
}

fn throughput_patterns(
    channel: &str,
    word: &str,
    short: &str,
    (other_channel, other_word, other_short): (&str, &str, &str),
) -> FamilyPatterns {
    FamilyPatterns {
        specific: vec![
            format!("{channel}.*{TP}"),
            format!(r"({word}|\b{short}(\b|_)).*{TP}"),
            format!(r"\b{short}{TP}"),
            format!(r"{TP}(.*({word}|\b{short}\b)|_?{short}\b)"),
        ],
        bare: "throughput|tput|bitrate",
        opposite: Some(format!("{other_channel}|{}", direction(other_word, other_short))),
    }
}

fn patterns_for(kpi: KpiType) -> FamilyPatterns {
    match kpi {
        KpiType::Rsrp => FamilyPatterns {
            specific: vec![r"(serving|pcell).*rsrp".to_string()],
            bare: "rsrp",
            opposite: None,
        },
        KpiType::Rsrq => FamilyPatterns {
            specific: vec![r"(serving|pcell).*rsrq".to_string()],
            bare: "rsrq",
            opposite: None,
        },
        KpiType::Sinr => FamilyPatterns {
            specific: vec![r"(serving|pcell).*sinr".to_string()],
            bare: r"sinr|\bsnr\b",
            opposite: None,
        },
        KpiType::DlTp => throughput_patterns("pdsch", "downlink", "dl", ("pusch", "uplink", "ul")),
        KpiType::UlTp => throughput_patterns("pusch", "uplink", "ul", ("pdsch", "downlink", "dl")),
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Skipping KPI pattern '{}': {}", pattern, e);
            None
        }
    }
}

#[derive(Debug, Clone)]
struct Qualifiers {
    serving: Option<Regex>,
    shared_channel: Option<Regex>,
    direction: Option<Regex>,
}

impl Qualifiers {
    fn new() -> Self {
        Self {
            serving: compile(r"serving|pcell"),
            shared_channel: compile(r"pdsch|pusch"),
            direction: compile(&format!(
                "{}|{}",
                direction("uplink", "ul"),
                direction("downlink", "dl")
            )),
        }
    }

    fn score(&self, name: &str) -> usize {
        let hit = |re: &Option<Regex>| re.as_ref().is_some_and(|re| re.is_match(name));
        let mut score = 0;
        if hit(&self.serving) {
            score += 5;
        }
        if hit(&self.shared_channel) {
            score += 4;
        }
        if hit(&self.direction) {
            score += 3;
        }
        if name.to_lowercase().contains("pocket.data") {
            score += 2;
        }
        score
    }
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    entry: &'a MetricCatalogEntry,
    score: usize,
}

impl Candidate<'_> {
    fn rank(&self, other: &Self) -> Ordering {
        let samples = |c: &Self| c.entry.stats.sample_count;
        (samples(other) > 0)
            .cmp(&(samples(self) > 0))
            .then_with(|| other.score.cmp(&self.score))
            .then_with(|| samples(other).cmp(&samples(self)))
            .then_with(|| self.entry.name.cmp(&other.entry.name))
    }
}

#[derive(Debug, Clone)]
struct Family {
    kpi: KpiType,
    specific: Vec<Regex>,
    bare: Option<Regex>,
    opposite: Option<Regex>,
}

impl Family {
    fn new(kpi: KpiType) -> Self {
        let patterns = patterns_for(kpi);
        Self {
            kpi,
            specific: patterns.specific.iter().filter_map(|p| compile(p)).collect(),
            bare: compile(patterns.bare),
            opposite: patterns.opposite.as_deref().and_then(compile),
        }
    }

    fn matches(&self, name: &str) -> bool {
        if self.specific.iter().any(|re| re.is_match(name)) {
            return true;
        }
        let bare = self.bare.as_ref().is_some_and(|re| re.is_match(name));
        bare && !self.opposite.as_ref().is_some_and(|re| re.is_match(name))
    }
}

/// Picks one metric per KPI family from a metric catalog
#[derive(Debug, Clone)]
pub struct KpiSelector {
    families: Vec<Family>,
    qualifiers: Qualifiers,
}

impl Default for KpiSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl KpiSelector {
    pub fn new() -> Self {
        Self {
            families: KpiType::ALL.iter().map(|kpi| Family::new(*kpi)).collect(),
            qualifiers: Qualifiers::new(),
        }
    }

    pub fn score(&self, entry: &MetricCatalogEntry) -> usize {
        self.qualifiers.score(&entry.name) + entry.stats.sample_count.min(SAMPLE_SCORE_CAP)
    }

    pub fn select(&self, metrics: &[MetricCatalogEntry]) -> KpiSelection {
        let mut selection = KpiSelection::default();

        for family in &self.families {
            let kpi = &family.kpi;
            let mut candidates: Vec<Candidate<'_>> = metrics
                .iter()
                .filter(|m| family.matches(&m.name))
                .map(|entry| Candidate {
                    entry,
                    score: self.score(entry),
                })
                .collect();
            candidates.sort_by(|a, b| a.rank(b));

            let Some(best) = candidates.first() else {
                selection.chosen.insert(*kpi, None);
                selection.missing_data.push(MissingKpi {
                    kpi_type: *kpi,
                    reason: REASON_NOT_DECLARED.to_string(),
                    candidates_found_count: 0,
                });
                continue;
            };

            debug!(
                "KPI {}: chose '{}' (score {}) from {} candidates",
                kpi,
                best.entry.name,
                best.score,
                candidates.len()
            );
            selection
                .chosen
                .insert(*kpi, Some(best.entry.name.clone()));
            selection.stats.insert(*kpi, best.entry.stats.clone());
            if best.entry.stats.sample_count == 0 {
                selection.missing_data.push(MissingKpi {
                    kpi_type: *kpi,
                    reason: REASON_NO_SAMPLES.to_string(),
                    candidates_found_count: candidates.len(),
                });
            }
        }

        selection
    }
}

/// Convenience wrapper over a default [`KpiSelector`]
pub fn select_kpis(metrics: &[MetricCatalogEntry]) -> KpiSelection {
    KpiSelector::new().select(metrics)
}

/// Chosen metric names keyed by KPI type string, for display
pub fn chosen_names(selection: &KpiSelection) -> BTreeMap<String, String> {
    selection
        .chosen
        .iter()
        .filter_map(|(kpi, name)| name.as_ref().map(|n| (kpi.to_string(), n.clone())))
        .collect()
}
