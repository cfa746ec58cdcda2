use serde::{Deserialize, Serialize};

use super::{Observation, Verdict};

/// Observation field a threshold condition can bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObsField {
    WindSpeed,
    WindGust,
    PrecipProbability,
    Temperature,
    Humidity,
    CloudBase,
    FogProbability,
}

/// Comparison operator. Inclusiveness is carried by the rule, not the
/// evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cmp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Cmp {
    fn holds(&self, actual: f64, threshold: f64) -> bool {
        match self {
            Cmp::Gt => actual > threshold,
            Cmp::Ge => actual >= threshold,
            Cmp::Lt => actual < threshold,
            Cmp::Le => actual <= threshold,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Threshold { field: ObsField, op: Cmp, value: f64 },
    /// Wind direction inside an inclusive arc, wrapping across 0/360:
    /// [350, 10] contains 355 and 5 but not 180.
    DirectionArc { from_deg: u16, to_deg: u16 },
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum InvalidRule {
    #[error("rule {0}: cooldown must be > 0 seconds")]
    ZeroCooldown(String),
    #[error("rule {0}: at least one condition is required")]
    NoConditions(String),
    #[error("rule {0}: direction degrees must be < 360 (got {1})")]
    BadDegrees(String, u16),
    #[error("rule {0}: threshold value must be finite")]
    BadThreshold(String),
}

/// A threshold predicate over one or more observation fields, plus a
/// cooldown. Immutable once built; editing a rule means a new rule id,
/// so stale cooldown state never attaches to the edited version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub conditions: Vec<Condition>,
    pub cooldown_seconds: u64,
}

impl Rule {
    pub fn new(
        id: String,
        conditions: Vec<Condition>,
        cooldown_seconds: u64,
    ) -> Result<Self, InvalidRule> {
        if cooldown_seconds == 0 {
            return Err(InvalidRule::ZeroCooldown(id));
        }
        if conditions.is_empty() {
            return Err(InvalidRule::NoConditions(id));
        }
        for c in &conditions {
            match c {
                Condition::Threshold { value, .. } => {
                    if !value.is_finite() {
                        return Err(InvalidRule::BadThreshold(id));
                    }
                }
                Condition::DirectionArc { from_deg, to_deg } => {
                    let bad = [*from_deg, *to_deg].into_iter().find(|d| *d >= 360);
                    if let Some(d) = bad {
                        return Err(InvalidRule::BadDegrees(id, d));
                    }
                }
            }
        }
        Ok(Self {
            id,
            conditions,
            cooldown_seconds,
        })
    }

    /// Pure, deterministic evaluation. A missing required field makes
    /// the whole verdict InsufficientData; it is never coerced to Ok
    /// or Alert.
    pub fn evaluate(&self, obs: &Observation) -> Verdict {
        let mut all_hold = true;

        for c in &self.conditions {
            match c {
                Condition::Threshold { field, op, value } => {
                    let actual = match field_value(obs, *field) {
                        Some(v) => v,
                        None => return Verdict::InsufficientData,
                    };
                    if !op.holds(actual, *value) {
                        all_hold = false;
                    }
                }
                Condition::DirectionArc { from_deg, to_deg } => {
                    if !arc_contains(*from_deg, *to_deg, obs.wind_direction_deg) {
                        all_hold = false;
                    }
                }
            }
        }

        if all_hold {
            Verdict::Alert
        } else {
            Verdict::Ok
        }
    }
}

fn field_value(obs: &Observation, field: ObsField) -> Option<f64> {
    match field {
        ObsField::WindSpeed => Some(obs.wind_speed_ms),
        ObsField::WindGust => obs.wind_gust_ms,
        ObsField::PrecipProbability => Some(obs.precip_probability),
        ObsField::Temperature => obs.temperature_c,
        ObsField::Humidity => obs.humidity_pct,
        ObsField::CloudBase => obs.cloud_base_m,
        ObsField::FogProbability => obs.fog_probability,
    }
}

fn arc_contains(from: u16, to: u16, dir: u16) -> bool {
    if from <= to {
        (from..=to).contains(&dir)
    } else {
        // wraps across north
        dir >= from || dir <= to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(wind: f64, gust: Option<f64>, dir: u16) -> Observation {
        Observation {
            location_id: "site".into(),
            wind_speed_ms: wind,
            wind_gust_ms: gust,
            wind_direction_deg: dir,
            precip_probability: 0.1,
            temperature_c: Some(15.0),
            humidity_pct: Some(60.0),
            cloud_base_m: None,
            fog_probability: None,
            observed_at: 0,
        }
    }

    fn wind_gt(value: f64) -> Condition {
        Condition::Threshold {
            field: ObsField::WindSpeed,
            op: Cmp::Gt,
            value,
        }
    }

    #[test]
    fn zero_cooldown_is_rejected() {
        let err = Rule::new("r".into(), vec![wind_gt(10.0)], 0);
        assert!(matches!(err, Err(InvalidRule::ZeroCooldown(_))));
    }

    #[test]
    fn empty_conditions_are_rejected() {
        assert!(matches!(
            Rule::new("r".into(), vec![], 60),
            Err(InvalidRule::NoConditions(_))
        ));
    }

    #[test]
    fn degrees_over_359_are_rejected() {
        let arc = Condition::DirectionArc {
            from_deg: 350,
            to_deg: 360,
        };
        assert!(matches!(
            Rule::new("r".into(), vec![arc], 60),
            Err(InvalidRule::BadDegrees(_, 360))
        ));
    }

    #[test]
    fn threshold_above_alerts() {
        let rule = Rule::new("wind".into(), vec![wind_gt(10.0)], 3600).unwrap();
        assert_eq!(rule.evaluate(&obs(12.0, Some(14.0), 0)), Verdict::Alert);
        assert_eq!(rule.evaluate(&obs(9.0, Some(14.0), 0)), Verdict::Ok);
        // boundary: gt is exclusive
        assert_eq!(rule.evaluate(&obs(10.0, Some(14.0), 0)), Verdict::Ok);
    }

    #[test]
    fn ge_is_inclusive() {
        let rule = Rule::new(
            "wind".into(),
            vec![Condition::Threshold {
                field: ObsField::WindSpeed,
                op: Cmp::Ge,
                value: 10.0,
            }],
            3600,
        )
        .unwrap();
        assert_eq!(rule.evaluate(&obs(10.0, None, 0)), Verdict::Alert);
    }

    #[test]
    fn missing_gust_is_insufficient_data() {
        let rule = Rule::new(
            "gust".into(),
            vec![Condition::Threshold {
                field: ObsField::WindGust,
                op: Cmp::Gt,
                value: 12.0,
            }],
            3600,
        )
        .unwrap();
        assert_eq!(rule.evaluate(&obs(15.0, None, 0)), Verdict::InsufficientData);
    }

    #[test]
    fn cloud_base_rule_needs_a_provider_that_reports_it() {
        let rule = Rule::new(
            "low-ceiling".into(),
            vec![Condition::Threshold {
                field: ObsField::CloudBase,
                op: Cmp::Lt,
                value: 500.0,
            }],
            3600,
        )
        .unwrap();

        // no cloud base in the snapshot: never coerced to Ok
        assert_eq!(rule.evaluate(&obs(3.0, None, 0)), Verdict::InsufficientData);

        let mut low = obs(3.0, None, 0);
        low.cloud_base_m = Some(300.0);
        assert_eq!(rule.evaluate(&low), Verdict::Alert);

        let mut high = obs(3.0, None, 0);
        high.cloud_base_m = Some(1800.0);
        assert_eq!(rule.evaluate(&high), Verdict::Ok);
    }

    #[test]
    fn missing_field_beats_a_failing_condition() {
        // wind 5.0 fails the threshold, but the absent gust must still
        // produce InsufficientData, not Ok
        let rule = Rule::new(
            "both".into(),
            vec![
                wind_gt(10.0),
                Condition::Threshold {
                    field: ObsField::WindGust,
                    op: Cmp::Gt,
                    value: 12.0,
                },
            ],
            3600,
        )
        .unwrap();
        assert_eq!(rule.evaluate(&obs(5.0, None, 0)), Verdict::InsufficientData);
    }

    #[test]
    fn direction_arc_wraps_across_north() {
        let rule = Rule::new(
            "arc".into(),
            vec![Condition::DirectionArc {
                from_deg: 350,
                to_deg: 10,
            }],
            3600,
        )
        .unwrap();
        assert_eq!(rule.evaluate(&obs(1.0, None, 355)), Verdict::Alert);
        assert_eq!(rule.evaluate(&obs(1.0, None, 5)), Verdict::Alert);
        assert_eq!(rule.evaluate(&obs(1.0, None, 180)), Verdict::Ok);
    }

    #[test]
    fn plain_arc_is_inclusive_on_both_ends() {
        let rule = Rule::new(
            "arc".into(),
            vec![Condition::DirectionArc {
                from_deg: 90,
                to_deg: 180,
            }],
            3600,
        )
        .unwrap();
        assert_eq!(rule.evaluate(&obs(1.0, None, 90)), Verdict::Alert);
        assert_eq!(rule.evaluate(&obs(1.0, None, 180)), Verdict::Alert);
        assert_eq!(rule.evaluate(&obs(1.0, None, 181)), Verdict::Ok);
    }

    #[test]
    fn multi_condition_rule_needs_all() {
        // sustained wind over 8 and gust under 15 and wind from the south
        let rule = Rule::new(
            "soarable".into(),
            vec![
                wind_gt(8.0),
                Condition::Threshold {
                    field: ObsField::WindGust,
                    op: Cmp::Lt,
                    value: 15.0,
                },
                Condition::DirectionArc {
                    from_deg: 135,
                    to_deg: 225,
                },
            ],
            1800,
        )
        .unwrap();

        assert_eq!(rule.evaluate(&obs(10.0, Some(12.0), 180)), Verdict::Alert);
        assert_eq!(rule.evaluate(&obs(10.0, Some(20.0), 180)), Verdict::Ok);
        assert_eq!(rule.evaluate(&obs(10.0, Some(12.0), 0)), Verdict::Ok);
    }
}
