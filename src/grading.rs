use serde::Deserialize;

use crate::table::Cell;

#[derive(Debug, Clone)]
pub struct GradeRule {
    pub min: f64,
    pub max: f64,
    pub grade: String,
    pub remark: String,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeOutcome {
    pub grade: String,
    pub remark: String,
    pub points: f64,
}

impl GradeOutcome {
    /// Score could not be coerced to a number.
    pub fn unscored() -> Self {
        GradeOutcome {
            grade: "-".to_string(),
            remark: String::new(),
            points: 0.0,
        }
    }

    /// No rule range covered the score.
    pub fn ungraded() -> Self {
        GradeOutcome {
            grade: "-".to_string(),
            remark: "Not Graded".to_string(),
            points: 0.0,
        }
    }

    /// The supplied scheme was not a JSON list of rules.
    pub fn invalid_scheme() -> Self {
        GradeOutcome {
            grade: "-".to_string(),
            remark: "Invalid Scheme".to_string(),
            points: 0.0,
        }
    }
}

/// Rule as it arrives in upload configuration. Individual rules missing any
/// key are dropped at parse time rather than failing the whole scheme.
#[derive(Debug, Deserialize)]
struct RawRule {
    min: Option<f64>,
    max: Option<f64>,
    grade: Option<String>,
    remark: Option<String>,
    points: Option<f64>,
}

impl RawRule {
    fn into_rule(self) -> Option<GradeRule> {
        Some(GradeRule {
            min: self.min?,
            max: self.max?,
            grade: self.grade?,
            remark: self.remark?,
            points: self.points?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GradingScheme {
    rules: Vec<GradeRule>,
    malformed: bool,
}

impl GradingScheme {
    /// Parse the raw JSON text from the upload record. Absent or blank text
    /// selects the default bands; text that is not a JSON list degrades to a
    /// scheme that marks every score "Invalid Scheme" instead of failing the
    /// run.
    pub fn parse(raw: Option<&str>) -> GradingScheme {
        let text = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => text,
            None => return GradingScheme::default_bands(),
        };

        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(serde_json::Value::Array(items)) => {
                let rules = items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value::<RawRule>(item).ok())
                    .filter_map(RawRule::into_rule)
                    .collect();
                GradingScheme {
                    rules,
                    malformed: false,
                }
            }
            _ => GradingScheme {
                rules: Vec::new(),
                malformed: true,
            },
        }
    }

    pub fn from_rules(rules: Vec<GradeRule>) -> GradingScheme {
        GradingScheme {
            rules,
            malformed: false,
        }
    }

    /// CBC-style bands used when an upload supplies no scheme.
    pub fn default_bands() -> GradingScheme {
        let band = |min: f64, max: f64, grade: &str, remark: &str, points: f64| GradeRule {
            min,
            max,
            grade: grade.to_string(),
            remark: remark.to_string(),
            points,
        };
        GradingScheme {
            rules: vec![
                band(80.0, 100.0, "EE", "Exceeding Expectation", 4.0),
                band(50.0, 79.0, "ME", "Meeting Expectation", 3.0),
                band(40.0, 49.0, "AE", "Approaching Expectation", 2.0),
                band(0.0, 39.0, "BE", "Below Expectation", 1.0),
            ],
            malformed: false,
        }
    }

    /// Pure and total: defined for every f64 input, first matching rule in
    /// list order wins, no match yields the ungraded sentinel.
    pub fn grade(&self, score: f64) -> GradeOutcome {
        if score.is_nan() {
            return GradeOutcome::unscored();
        }
        if self.malformed {
            return GradeOutcome::invalid_scheme();
        }
        let s = score.round();
        for rule in &self.rules {
            if rule.min <= s && s <= rule.max {
                return GradeOutcome {
                    grade: rule.grade.clone(),
                    remark: rule.remark.clone(),
                    points: rule.points,
                };
            }
        }
        GradeOutcome::ungraded()
    }

    /// Grade a raw table cell: anything that does not coerce to a number is
    /// unscored rather than an error.
    pub fn grade_cell(&self, cell: &Cell) -> GradeOutcome {
        match cell.as_number() {
            Some(score) => self.grade(score),
            None => GradeOutcome::unscored(),
        }
    }
}
