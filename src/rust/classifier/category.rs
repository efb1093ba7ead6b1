use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ClassifierError;

/// Labels offered to the zero-shot model for every image.
///
/// The order matches the keyword table below; the model ranks them by score,
/// so the order here has no effect on which label wins.
pub const CANDIDATE_LABELS: &[&str] = &[
    "plastic", "paper", "cardboard", "metal", "glass",
    "food", "fruit", "vegetable", "plant", "leaves",
    "battery", "electronic", "chemical", "medicine",
    "general waste", "trash",
];

/// Reserved keyword of the fallback rule.
pub const DEFAULT_KEYWORD: &str = "default";

/// The four disposal buckets every classification ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WasteCategory {
    Recyclable,
    Compostable,
    Hazardous,
    General,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 4] = [
        Self::Recyclable,
        Self::Compostable,
        Self::Hazardous,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recyclable => "recyclable",
            Self::Compostable => "compostable",
            Self::Hazardous => "hazardous",
            Self::General => "general",
        }
    }

    /// Which bin the item belongs in, phrased for an end user.
    pub fn disposal_instruction(&self) -> &'static str {
        match self {
            Self::Recyclable => "This item can be recycled. Please place it in the recycling bin.",
            Self::Compostable => "This item can be composted. Please place it in the compost bin.",
            Self::Hazardous => {
                "This item is hazardous waste. Please dispose of it at a designated facility."
            }
            Self::General => "This item goes in general waste.",
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteCategory {
    type Err = ClassifierError;

    /// Parses a category name, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    /// `ValidationError` if `s` names no category.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == lowered)
            .ok_or_else(|| {
                ClassifierError::ValidationError(format!("Unknown waste category: '{}'", s))
            })
    }
}

/// One entry of the keyword table: a lowercase fragment and what it means for disposal.
#[derive(Debug, PartialEq)]
pub struct CategoryRule {
    pub keyword: &'static str,
    pub category: WasteCategory,
    pub description: &'static str,
    pub tips: &'static [&'static str],
}

/// Keyword table in priority order. Recyclables are tested before compostables,
/// compostables before hazardous; the `default` entry must stay last.
pub static CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        keyword: "plastic",
        category: WasteCategory::Recyclable,
        description: "This appears to be plastic waste.",
        tips: &[
            "Rinse containers before recycling",
            "Remove caps and lids",
            "Check for recycling symbols",
        ],
    },
    CategoryRule {
        keyword: "paper",
        category: WasteCategory::Recyclable,
        description: "This appears to be paper waste.",
        tips: &[
            "Keep paper dry and clean",
            "Flatten cardboard boxes",
            "Remove tape and staples if possible",
        ],
    },
    CategoryRule {
        keyword: "cardboard",
        category: WasteCategory::Recyclable,
        description: "This appears to be cardboard waste.",
        tips: &["Flatten boxes to save space", "Remove tape and staples", "Keep dry and clean"],
    },
    CategoryRule {
        keyword: "metal",
        category: WasteCategory::Recyclable,
        description: "This appears to be metal waste.",
        tips: &[
            "Rinse food residue",
            "Crush cans to save space",
            "Remove paper labels if possible",
        ],
    },
    CategoryRule {
        keyword: "glass",
        category: WasteCategory::Recyclable,
        description: "This appears to be glass waste.",
        tips: &[
            "Rinse containers",
            "Remove caps and lids",
            "Sort by color if required in your area",
        ],
    },
    CategoryRule {
        keyword: "food",
        category: WasteCategory::Compostable,
        description: "This appears to be food waste.",
        tips: &[
            "Avoid meat and dairy in home compost",
            "Cut into smaller pieces to speed decomposition",
            "Mix with dry materials",
        ],
    },
    CategoryRule {
        keyword: "fruit",
        category: WasteCategory::Compostable,
        description: "This appears to be fruit waste.",
        tips: &[
            "Cut into smaller pieces",
            "Include peels and cores",
            "Mix with dry materials like leaves",
        ],
    },
    CategoryRule {
        keyword: "vegetable",
        category: WasteCategory::Compostable,
        description: "This appears to be vegetable waste.",
        tips: &[
            "Cut into smaller pieces",
            "All vegetable scraps are compostable",
            "Mix with dry materials",
        ],
    },
    CategoryRule {
        keyword: "plant",
        category: WasteCategory::Compostable,
        description: "This appears to be plant waste.",
        tips: &[
            "Cut into smaller pieces",
            "Avoid diseased plants",
            "Mix green and brown materials",
        ],
    },
    CategoryRule {
        keyword: "leaves",
        category: WasteCategory::Compostable,
        description: "These appear to be leaves or yard waste.",
        tips: &[
            "Shred to speed decomposition",
            "Mix with food scraps for balance",
            "Keep slightly moist",
        ],
    },
    CategoryRule {
        keyword: "battery",
        category: WasteCategory::Hazardous,
        description: "This appears to be a battery.",
        tips: &[
            "Never throw in regular trash",
            "Take to special collection points",
            "Store in a cool, dry place before disposal",
        ],
    },
    CategoryRule {
        keyword: "electronic",
        category: WasteCategory::Hazardous,
        description: "This appears to be electronic waste.",
        tips: &[
            "Take to e-waste collection centers",
            "Data should be wiped from devices",
            "Check if manufacturer has a take-back program",
        ],
    },
    CategoryRule {
        keyword: "chemical",
        category: WasteCategory::Hazardous,
        description: "This appears to be chemical waste.",
        tips: &[
            "Never pour down drains",
            "Keep in original containers",
            "Take to hazardous waste collection",
        ],
    },
    CategoryRule {
        keyword: "medicine",
        category: WasteCategory::Hazardous,
        description: "This appears to be medicine waste.",
        tips: &[
            "Never flush medications",
            "Take to pharmacy take-back programs",
            "Remove personal information from containers",
        ],
    },
    CategoryRule {
        keyword: DEFAULT_KEYWORD,
        category: WasteCategory::General,
        description: "This appears to be general waste.",
        tips: &[
            "Consider if any parts can be recycled",
            "Minimize waste when possible",
            "Dispose in general waste bin",
        ],
    },
];

/// What a single classification call hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: WasteCategory,
    pub confidence: f32,
    pub description: String,
    pub tips: Vec<String>,
}

impl ClassificationResult {
    fn from_rule(rule: &CategoryRule, confidence: f32) -> Self {
        Self {
            category: rule.category,
            confidence,
            description: rule.description.to_string(),
            tips: rule.tips.iter().map(|tip| tip.to_string()).collect(),
        }
    }
}

/// The fallback rule used when no keyword matches.
pub fn default_rule() -> &'static CategoryRule {
    // The table is static and ends with the default entry.
    &CATEGORY_RULES[CATEGORY_RULES.len() - 1]
}

/// Finds the first rule whose keyword occurs in the lowercased label.
///
/// The `default` entry never matches textually; it is only returned when
/// nothing else does.
pub fn match_rule(label: &str) -> &'static CategoryRule {
    let label = label.to_lowercase();
    CATEGORY_RULES
        .iter()
        .filter(|rule| rule.keyword != DEFAULT_KEYWORD)
        .find(|rule| label.contains(rule.keyword))
        .unwrap_or_else(default_rule)
}

/// Maps the model's top label to a disposal category, passing the confidence through untouched.
///
/// Total over all strings: empty or unrecognised labels resolve to `general`.
pub fn resolve(top_label: &str, confidence: f32) -> ClassificationResult {
    ClassificationResult::from_rule(match_rule(top_label), confidence)
}
