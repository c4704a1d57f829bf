//! Rule evaluator. Resolves conditions and rule sets against subscriber
//! records, and scans a subscriber collection in a single pass to produce a
//! match count plus a deterministic sample.

use std::borrow::Borrow;
use std::time::Instant;

use chrono::{DateTime, Utc};
use segment_core::types::{Subscriber, SubscriberSummary};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::condition::{Condition, ConditionValue, MatchMode, RuleSet};
use crate::fields::{FieldName, Operator};

/// Default number of matching subscribers returned with a count.
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

/// Result of evaluating a rule set over a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, ToSchema)]
pub struct EvaluationResult {
    pub count: u64,
    /// First matches in iteration order, capped at the sample limit.
    #[serde(rename = "subscribers")]
    pub sample: Vec<SubscriberSummary>,
}

impl EvaluationResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Subscriber attribute as seen by a condition.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldValue<'a> {
    Text(&'a str),
    List(&'a [String]),
    Number(f64),
    Missing,
}

/// Evaluates rule sets. Derived day-count fields are computed against a
/// single instant captured when the evaluator is created.
#[derive(Debug, Clone)]
pub struct Evaluator {
    now: DateTime<Utc>,
    sample_limit: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Evaluator pinned to a fixed instant.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }

    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Whether a single condition holds for the subscriber. A condition that
    /// is not evaluable never holds.
    pub fn condition_matches(&self, condition: &Condition, subscriber: &Subscriber) -> bool {
        match CompiledCondition::compile(condition) {
            Some(compiled) => compiled.matches(self.resolve(condition.field, subscriber)),
            None => false,
        }
    }

    /// Whether the subscriber belongs to the audience described by the rule
    /// set. Only evaluable conditions take part; with none, nothing matches.
    pub fn matches(&self, rules: &RuleSet, subscriber: &Subscriber) -> bool {
        Plan::compile(rules).matches(self, subscriber)
    }

    /// Single pass over `subscribers`. A rule set without evaluable
    /// conditions returns an empty result without consuming the iterator.
    pub fn evaluate<I, S>(&self, rules: &RuleSet, subscribers: I) -> EvaluationResult
    where
        I: IntoIterator<Item = S>,
        S: Borrow<Subscriber>,
    {
        let plan = Plan::compile(rules);
        if plan.is_empty() {
            debug!("Rule set has no evaluable conditions; skipping scan");
            return EvaluationResult::empty();
        }

        let started = Instant::now();
        let mut scanned: u64 = 0;
        let mut result = EvaluationResult {
            count: 0,
            sample: Vec::with_capacity(self.sample_limit),
        };

        for subscriber in subscribers {
            let subscriber = subscriber.borrow();
            scanned += 1;
            if plan.matches(self, subscriber) {
                result.count += 1;
                if result.sample.len() < self.sample_limit {
                    result.sample.push(subscriber.summary());
                }
            }
        }

        debug!(
            scanned,
            matched = result.count,
            conditions = plan.conditions.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Rule set evaluated"
        );
        result
    }

    fn resolve<'a>(&self, field: FieldName, subscriber: &'a Subscriber) -> FieldValue<'a> {
        let number = |n: Option<f64>| n.map(FieldValue::Number).unwrap_or(FieldValue::Missing);
        match field {
            FieldName::Source => subscriber
                .source
                .as_deref()
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Missing),
            FieldName::Tags => FieldValue::List(&subscriber.tags),
            FieldName::EngagementLevel => subscriber
                .engagement_level
                .map(|level| FieldValue::Text(level.as_str()))
                .unwrap_or(FieldValue::Missing),
            FieldName::SubscribedDaysAgo => {
                FieldValue::Number(subscriber.subscribed_days_ago(self.now) as f64)
            }
            FieldName::EngagementScore => number(subscriber.engagement_score),
            FieldName::EmailsReceived => FieldValue::Number(subscriber.emails_received as f64),
            FieldName::LastEmailedDaysAgo => {
                number(subscriber.last_emailed_days_ago(self.now).map(|d| d as f64))
            }
            FieldName::LastOpenedDaysAgo => {
                number(subscriber.last_opened_days_ago(self.now).map(|d| d as f64))
            }
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Rule set reduced to its evaluable conditions, with numeric operands
/// parsed once per evaluation instead of once per subscriber.
struct Plan<'r> {
    match_mode: MatchMode,
    conditions: Vec<CompiledCondition<'r>>,
}

impl<'r> Plan<'r> {
    fn compile(rules: &'r RuleSet) -> Self {
        Self {
            match_mode: rules.match_mode,
            conditions: rules
                .conditions
                .iter()
                .filter_map(CompiledCondition::compile)
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn matches(&self, evaluator: &Evaluator, subscriber: &Subscriber) -> bool {
        if self.is_empty() {
            return false;
        }
        let holds = |c: &CompiledCondition<'r>| {
            c.matches(evaluator.resolve(c.condition.field, subscriber))
        };
        match self.match_mode {
            MatchMode::All => self.conditions.iter().all(holds),
            MatchMode::Any => self.conditions.iter().any(holds),
        }
    }
}

struct CompiledCondition<'r> {
    condition: &'r Condition,
    number: Option<f64>,
}

impl<'r> CompiledCondition<'r> {
    fn compile(condition: &'r Condition) -> Option<Self> {
        if !condition.is_evaluable() {
            return None;
        }
        Some(Self {
            condition,
            number: condition.numeric_value(),
        })
    }

    /// Missing subscriber values never match, whatever the operator.
    fn matches(&self, actual: FieldValue<'_>) -> bool {
        let value = &self.condition.value;
        match (self.condition.operator, actual) {
            (_, FieldValue::Missing) => false,
            (Operator::Equals, FieldValue::Text(text)) => scalar(value) == Some(text),
            (Operator::NotEquals, FieldValue::Text(text)) => {
                scalar(value).is_some_and(|s| s != text)
            }
            (Operator::In, FieldValue::Text(text)) => value.entries().any(|v| v == text),
            (Operator::NotIn, FieldValue::Text(text)) => !value.entries().any(|v| v == text),
            (Operator::Contains, FieldValue::List(items)) => {
                scalar(value).is_some_and(|s| items.iter().any(|i| i == s))
            }
            (Operator::NotContains, FieldValue::List(items)) => {
                scalar(value).is_some_and(|s| !items.iter().any(|i| i == s))
            }
            (Operator::Equals, FieldValue::Number(n)) => self.number == Some(n),
            (Operator::GreaterThan, FieldValue::Number(n)) => self.number.is_some_and(|v| n > v),
            (Operator::LessThan, FieldValue::Number(n)) => self.number.is_some_and(|v| n < v),
            // Shapes the operator table rules out.
            _ => false,
        }
    }
}

fn scalar(value: &ConditionValue) -> Option<&str> {
    match value {
        ConditionValue::Scalar(s) => Some(s.as_str()),
        ConditionValue::List(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use segment_core::types::EngagementLevel;
    use std::cell::Cell;

    fn now() -> DateTime<Utc> {
        "2026-10-16T12:00:00Z".parse().unwrap()
    }

    fn scenario_subscriber() -> Subscriber {
        let mut s = Subscriber::new("ig@example.com", now() - Duration::days(10));
        s.source = Some("instagram".into());
        s.tags = vec!["vip".into(), "new".into()];
        s.engagement_level = Some(EngagementLevel::Engaged);
        s
    }

    fn cond(field: FieldName, op: Operator, value: impl Into<ConditionValue>) -> Condition {
        Condition::new(field, op, value).unwrap()
    }

    fn population(n: usize) -> Vec<Subscriber> {
        (0..n)
            .map(|i| {
                let mut s = Subscriber::new(format!("user{i}@example.com"), now());
                s.source = Some(if i % 2 == 0 { "instagram" } else { "referral" }.into());
                s.emails_received = i as u32;
                s
            })
            .collect()
    }

    #[test]
    fn test_scenario_a_all_matches() {
        let rules = RuleSet::all(vec![
            cond(FieldName::Source, Operator::Equals, "instagram"),
            cond(FieldName::Tags, Operator::Contains, "vip"),
        ]);
        assert!(Evaluator::at(now()).matches(&rules, &scenario_subscriber()));
    }

    #[test]
    fn test_scenario_b_all_fails_on_second_condition() {
        let rules = RuleSet::all(vec![
            cond(FieldName::Source, Operator::Equals, "instagram"),
            cond(FieldName::Tags, Operator::NotContains, "vip"),
        ]);
        assert!(!Evaluator::at(now()).matches(&rules, &scenario_subscriber()));
    }

    #[test]
    fn test_scenario_c_any_succeeds_on_first_condition() {
        let rules = RuleSet::any(vec![
            cond(FieldName::Source, Operator::Equals, "instagram"),
            cond(FieldName::Tags, Operator::NotContains, "vip"),
        ]);
        assert!(Evaluator::at(now()).matches(&rules, &scenario_subscriber()));
    }

    #[test]
    fn test_scenario_d_subscribed_days_ago() {
        let evaluator = Evaluator::at(now());
        let condition = cond(FieldName::SubscribedDaysAgo, Operator::GreaterThan, "5");
        assert!(evaluator.condition_matches(&condition, &scenario_subscriber()));

        let recent = Subscriber::new("recent@example.com", now() - Duration::days(2));
        assert!(!evaluator.condition_matches(&condition, &recent));
    }

    #[test]
    fn test_scenario_e_enum_in_list() {
        let mut churned = scenario_subscriber();
        churned.engagement_level = Some(EngagementLevel::Churned);
        let condition = cond(FieldName::EngagementLevel, Operator::In, vec!["cold", "at_risk"]);
        assert!(!Evaluator::at(now()).condition_matches(&condition, &churned));

        churned.engagement_level = Some(EngagementLevel::AtRisk);
        assert!(Evaluator::at(now()).condition_matches(&condition, &churned));
    }

    #[test]
    fn test_text_equality_is_case_sensitive() {
        let evaluator = Evaluator::at(now());
        let subscriber = scenario_subscriber();
        assert!(!evaluator.condition_matches(
            &cond(FieldName::Source, Operator::Equals, "Instagram"),
            &subscriber
        ));
        assert!(evaluator.condition_matches(
            &cond(FieldName::Source, Operator::NotEquals, "Instagram"),
            &subscriber
        ));
        assert!(evaluator.condition_matches(
            &cond(FieldName::Source, Operator::NotIn, vec!["facebook", "tiktok"]),
            &subscriber
        ));
    }

    #[test]
    fn test_numeric_comparisons() {
        let evaluator = Evaluator::at(now());
        let mut subscriber = scenario_subscriber();
        subscriber.engagement_score = Some(72.5);
        subscriber.emails_received = 3;

        assert!(evaluator.condition_matches(
            &cond(FieldName::EngagementScore, Operator::GreaterThan, "70"),
            &subscriber
        ));
        assert!(!evaluator.condition_matches(
            &cond(FieldName::EngagementScore, Operator::LessThan, "72.5"),
            &subscriber
        ));
        assert!(evaluator.condition_matches(
            &cond(FieldName::EmailsReceived, Operator::Equals, "3"),
            &subscriber
        ));
        assert!(evaluator.condition_matches(
            &cond(FieldName::EmailsReceived, Operator::Equals, "3.0"),
            &subscriber
        ));
    }

    #[test]
    fn test_missing_values_never_match_even_when_negated() {
        let evaluator = Evaluator::at(now());
        let bare = Subscriber::new("bare@example.com", now() - Duration::days(1));

        let negated = [
            cond(FieldName::Source, Operator::NotEquals, "instagram"),
            cond(FieldName::Source, Operator::NotIn, vec!["instagram"]),
            cond(FieldName::EngagementLevel, Operator::NotEquals, "churned"),
            cond(FieldName::EngagementLevel, Operator::NotIn, vec!["cold"]),
        ];
        for condition in &negated {
            assert!(
                !evaluator.condition_matches(condition, &bare),
                "{} {} should not match a missing value",
                condition.field,
                condition.operator
            );
        }

        let numeric = [
            cond(FieldName::EngagementScore, Operator::LessThan, "100"),
            cond(FieldName::LastEmailedDaysAgo, Operator::GreaterThan, "-1"),
            cond(FieldName::LastOpenedDaysAgo, Operator::LessThan, "1000"),
            cond(FieldName::LastOpenedDaysAgo, Operator::Equals, "0"),
        ];
        for condition in &numeric {
            assert!(!evaluator.condition_matches(condition, &bare));
        }
    }

    #[test]
    fn test_not_contains_matches_subscriber_without_tags() {
        let bare = Subscriber::new("bare@example.com", now());
        let condition = cond(FieldName::Tags, Operator::NotContains, "vip");
        assert!(Evaluator::at(now()).condition_matches(&condition, &bare));
    }

    #[test]
    fn test_last_opened_days_ago_is_derived() {
        let mut subscriber = scenario_subscriber();
        subscriber.last_opened_at = Some(now() - Duration::days(40) - Duration::hours(3));
        subscriber.email_sent_at = Some(now() - Duration::hours(5));
        let evaluator = Evaluator::at(now());

        assert!(evaluator.condition_matches(
            &cond(FieldName::LastOpenedDaysAgo, Operator::Equals, "40"),
            &subscriber
        ));
        assert!(evaluator.condition_matches(
            &cond(FieldName::LastEmailedDaysAgo, Operator::LessThan, "1"),
            &subscriber
        ));
    }

    #[test]
    fn test_all_requires_every_condition_any_requires_one() {
        let evaluator = Evaluator::at(now());
        let subscriber = scenario_subscriber();
        let hit = cond(FieldName::Source, Operator::Equals, "instagram");
        let miss = cond(FieldName::Tags, Operator::Contains, "wholesale");

        for (conditions, all, any) in [
            (vec![hit.clone(), hit.clone()], true, true),
            (vec![hit.clone(), miss.clone()], false, true),
            (vec![miss.clone(), miss.clone()], false, false),
        ] {
            assert_eq!(evaluator.matches(&RuleSet::all(conditions.clone()), &subscriber), all);
            assert_eq!(evaluator.matches(&RuleSet::any(conditions), &subscriber), any);
        }
    }

    #[test]
    fn test_blank_conditions_do_not_participate() {
        let evaluator = Evaluator::at(now());
        let subscriber = scenario_subscriber();
        let blank = Condition::for_field(FieldName::Tags);
        let hit = cond(FieldName::Source, Operator::Equals, "instagram");

        // A blank condition must not fail an `all` set...
        assert!(evaluator.matches(&RuleSet::all(vec![hit.clone(), blank.clone()]), &subscriber));
        // ...nor satisfy an `any` set on its own.
        assert!(!evaluator.matches(&RuleSet::any(vec![blank.clone()]), &subscriber));
        assert!(!evaluator.matches(&RuleSet::all(vec![blank]), &subscriber));
    }

    #[test]
    fn test_in_with_no_values_is_filtered_not_matched() {
        let evaluator = Evaluator::at(now());
        let subscriber = scenario_subscriber();
        let empty_in = Condition::for_field(FieldName::Source)
            .with_operator(Operator::In)
            .unwrap();
        let empty_not_in = empty_in.clone().with_operator(Operator::NotIn).unwrap();
        let hit = cond(FieldName::Tags, Operator::Contains, "vip");

        assert!(!evaluator.condition_matches(&empty_in, &subscriber));
        assert!(!evaluator.condition_matches(&empty_not_in, &subscriber));
        // Filtered out: the remaining condition decides alone, under either mode.
        assert!(evaluator.matches(&RuleSet::all(vec![empty_in.clone(), hit.clone()]), &subscriber));
        assert!(evaluator.matches(&RuleSet::any(vec![empty_not_in, hit]), &subscriber));
        assert_eq!(
            evaluator.evaluate(&RuleSet::any(vec![empty_in]), population(5).iter()),
            EvaluationResult::empty()
        );
    }

    #[test]
    fn test_no_evaluable_conditions_skips_scan() {
        let pulled = Cell::new(0usize);
        let people = population(20);
        let stream = people.iter().inspect(|_| pulled.set(pulled.get() + 1));

        let rules = RuleSet::all(vec![
            Condition::for_field(FieldName::Source),
            Condition::for_field(FieldName::EngagementScore),
        ]);
        let result = Evaluator::at(now()).evaluate(&rules, stream);

        assert_eq!(result.count, 0);
        assert!(result.sample.is_empty());
        assert_eq!(pulled.get(), 0);
    }

    #[test]
    fn test_sample_is_first_ten_in_iteration_order() {
        let people = population(50);
        let rules = RuleSet::all(vec![cond(FieldName::Source, Operator::Equals, "instagram")]);
        let result = Evaluator::at(now()).evaluate(&rules, people.iter());

        assert_eq!(result.count, 25);
        assert_eq!(result.sample.len(), 10);
        let expected: Vec<_> = people.iter().step_by(2).take(10).map(|s| s.id).collect();
        let actual: Vec<_> = result.sample.iter().map(|s| s.id).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_sample_limit_is_configurable() {
        let people = population(8);
        let rules = RuleSet::all(vec![cond(FieldName::EmailsReceived, Operator::GreaterThan, "1")]);
        let result = Evaluator::at(now())
            .with_sample_limit(3)
            .evaluate(&rules, people.clone());

        assert_eq!(result.count, 6);
        assert_eq!(result.sample.len(), 3);
        assert_eq!(result.sample[0].email, "user2@example.com");
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let people = population(30);
        let rules = RuleSet::any(vec![
            cond(FieldName::EmailsReceived, Operator::LessThan, "4"),
            cond(FieldName::Source, Operator::Equals, "referral"),
        ]);
        let evaluator = Evaluator::at(now());
        let first = evaluator.evaluate(&rules, people.iter());
        let second = evaluator.evaluate(&rules, people.iter());
        assert_eq!(first, second);
        assert_eq!(first.count, 17);
    }

    #[test]
    fn test_result_wire_shape() {
        let people = population(1);
        let rules = RuleSet::all(vec![cond(FieldName::Source, Operator::Equals, "instagram")]);
        let result = Evaluator::at(now()).evaluate(&rules, people.iter());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["subscribers"][0]["email"], "user0@example.com");
    }
}
