use std::fmt;

use crate::model::ScoreThresholds;

/// Policy bucket of a score relative to the configured thresholds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Tier {
    Bad,
    Warning,
    Good,
}

impl Tier {
    /// `score <= hide` is Bad, `score <= warning` is Warning, anything above
    /// is Good.
    pub fn classify(score: f64, thresholds: &ScoreThresholds) -> Self {
        if score <= thresholds.hide {
            Tier::Bad
        } else if score <= thresholds.warning {
            Tier::Warning
        } else {
            Tier::Good
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Tier::Bad => "bad",
            Tier::Warning => "warning",
            Tier::Good => "good",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Tier::Bad => "✘",
            Tier::Warning => "⚠️",
            Tier::Good => "✓",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.css_class())
    }
}
