use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{LedgerError, Result};
use crate::fiscal::Month;
use crate::normalizer::NormalizedRow;

/// Carrier whose files bundle several coverage lines and need per-row classification.
pub const MULTI_LINE_CARRIER: &str = "UHG";
pub const OTHER_CATEGORY: &str = "OTHER";

const PLAN_ID_PATTERN: &str = r"^([A-Z0-9&]+)(?:-([A-Z0-9&]+))?-([A-Z]{3})-(\d{4})$";

// ---------------------------------------------------------------------------
// Plan identifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanIdentifier {
    pub raw: String,
    pub carrier: String,
    pub subcode: Option<String>,
    pub month: Month,
    pub year: i32,
}

impl PlanIdentifier {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_uppercase();
        let re = Regex::new(PLAN_ID_PATTERN).map_err(|e| LedgerError::Other(e.to_string()))?;
        let invalid = || LedgerError::InvalidPlanIdentifier(raw.to_string());
        let caps = re.captures(&normalized).ok_or_else(invalid)?;

        let month = Month::from_code(&caps[3]).ok_or_else(invalid)?;
        let year: i32 = caps[4].parse().map_err(|_| invalid())?;
        let carrier = caps[1].to_string();
        let subcode = caps.get(2).map(|m| m.as_str().to_string());

        Ok(Self {
            raw: normalized.clone(),
            carrier,
            subcode,
            month,
            year,
        })
    }

    /// `CARRIER[-SUBCODE]`, the plan code for every row of a single-line carrier.
    pub fn base_plan(&self) -> String {
        match &self.subcode {
            Some(sub) => format!("{}-{}", self.carrier, sub),
            None => self.carrier.clone(),
        }
    }

    pub fn needs_row_classification(&self) -> bool {
        self.carrier == MULTI_LINE_CARRIER
    }
}

// ---------------------------------------------------------------------------
// Content rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl PlanRule {
    fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn matches(&self, tokens: &[String]) -> bool {
        self.keywords.iter().any(|k| contains_phrase(tokens, &tokenize(k)))
    }
}

/// Evaluation order matters: the first matching category wins.
pub fn default_rules() -> Vec<PlanRule> {
    vec![
        PlanRule::new("DENTAL", &["DENTAL", "DHMO", "DPPO"]),
        PlanRule::new("VISION", &["VISION", "VSP"]),
        PlanRule::new("LIFE", &["LIFE", "GTL", "TERM LIFE", "GROUP TERM LIFE"]),
        PlanRule::new("AD&D", &["AD&D", "ACCIDENTAL"]),
    ]
}

/// Upper-cased words; `&` stays inside a token so `AD&D` survives.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '&'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_uppercase())
        .collect()
}

fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && tokens.windows(phrase.len()).any(|w| w == phrase)
}

#[derive(Debug, Clone)]
pub struct PlanClassifier {
    rules: Vec<PlanRule>,
}

impl Default for PlanClassifier {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl PlanClassifier {
    /// Default rules with additional keywords appended per category.
    /// Unknown categories become new rules evaluated after the defaults.
    pub fn with_extra_keywords(extra: &BTreeMap<String, Vec<String>>) -> Self {
        let mut rules = default_rules();
        for (category, keywords) in extra {
            let category = category.trim().to_uppercase();
            match rules.iter_mut().find(|r| r.category == category) {
                Some(rule) => rule.keywords.extend(keywords.iter().cloned()),
                None => rules.push(PlanRule {
                    category,
                    keywords: keywords.clone(),
                }),
            }
        }
        Self { rules }
    }

    pub fn rules(&self) -> &[PlanRule] {
        &self.rules
    }

    /// Category for free text, `OTHER` when nothing matches.
    pub fn categorize(&self, text: &str) -> &str {
        let tokens = tokenize(text);
        self.rules
            .iter()
            .find(|r| r.matches(&tokens))
            .map(|r| r.category.as_str())
            .unwrap_or(OTHER_CATEGORY)
    }

    pub fn classify_row(&self, carrier: &str, row: &NormalizedRow) -> String {
        let text = [
            row.plan.as_str(),
            row.policy.as_str(),
            row.description.as_str(),
            row.coverage_type.as_str(),
        ]
        .join(" ");
        format!("{carrier}-{}", self.categorize(&text))
    }

    /// Canonical plan code for one row of a file uploaded under `id`.
    pub fn plan_for(&self, id: &PlanIdentifier, row: &NormalizedRow) -> String {
        if id.needs_row_classification() {
            self.classify_row(&id.carrier, row)
        } else {
            id.base_plan()
        }
    }
}
