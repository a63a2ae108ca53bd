//! Trigger Matcher: command/regex/keyword matching against inbound messages,
//! with a per-rule cooldown tracker. Compiled patterns are cached the same way
//! `waveforge-core`'s expression evaluator avoids re-parsing a `${{ }}` template on
//! every evaluation — built once, reused for the lifetime of the matcher.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;

use crate::error::{TriggerError, TriggerResult};
use crate::model::{IncomingMessage, TriggerRule, TriggerType};

#[derive(Debug, Clone)]
pub struct TriggerMatch {
    pub rule_name: String,
    pub workflow_path: String,
    pub captures: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched(TriggerMatch),
    Cooldown { rule_name: String, remaining: Duration },
    NoMatch,
}

struct CompiledRule {
    rule: TriggerRule,
    regex: Option<Regex>,
}

/// Evaluates rules in declared order against an incoming message; first match wins.
/// Cooldown stamps are tracked per rule name in a concurrent map, the same shape as
/// the cron orchestrator's running-jobs map.
pub struct TriggerMatcher {
    rules: Vec<CompiledRule>,
    cooldowns: DashMap<String, DateTime<Utc>>,
}

impl TriggerMatcher {
    pub fn new(rules: Vec<TriggerRule>) -> TriggerResult<Self> {
        let compiled = rules
            .into_iter()
            .map(|rule| {
                let regex = compile(&rule)?;
                Ok(CompiledRule { rule, regex })
            })
            .collect::<TriggerResult<Vec<_>>>()?;
        Ok(Self { rules: compiled, cooldowns: DashMap::new() })
    }

    /// Evaluates every enabled rule whose `sources` include `message.source`, in
    /// declared order, returning the first match, the first cooldown hit, or `NoMatch`.
    pub fn evaluate(&self, message: &IncomingMessage) -> MatchOutcome {
        for compiled in &self.rules {
            let rule = &compiled.rule;
            if !rule.enabled || !rule.sources.contains(&message.source) {
                continue;
            }

            if let Some(cooldown) = rule.cooldown {
                if let Some(remaining) = self.remaining_cooldown(&rule.name, cooldown) {
                    return MatchOutcome::Cooldown { rule_name: rule.name.clone(), remaining };
                }
            }

            if let Some(captures) = match_one(compiled, &message.text) {
                if rule.cooldown.is_some() {
                    self.cooldowns.insert(rule.name.clone(), Utc::now());
                }
                return MatchOutcome::Matched(TriggerMatch {
                    rule_name: rule.name.clone(),
                    workflow_path: rule.workflow_path.clone(),
                    captures,
                });
            }
        }
        MatchOutcome::NoMatch
    }

    fn remaining_cooldown(&self, rule_name: &str, cooldown: Duration) -> Option<Duration> {
        let last = *self.cooldowns.get(rule_name)?;
        let elapsed = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= cooldown {
            None
        } else {
            Some(cooldown - elapsed)
        }
    }
}

fn compile(rule: &TriggerRule) -> TriggerResult<Option<Regex>> {
    match rule.kind {
        TriggerType::Command => {
            let pattern = rule.pattern.as_deref().ok_or_else(|| TriggerError::InvalidPattern {
                rule: rule.name.clone(),
                reason: "command rules require a pattern".to_string(),
            })?;
            Some(compile_command(pattern))
                .transpose()
                .map_err(|reason| TriggerError::InvalidPattern { rule: rule.name.clone(), reason })
        }
        TriggerType::Pattern => {
            let pattern = rule.pattern.as_deref().ok_or_else(|| TriggerError::InvalidPattern {
                rule: rule.name.clone(),
                reason: "pattern rules require a pattern".to_string(),
            })?;
            let regex = Regex::new(&format!("(?i){pattern}"))
                .map_err(|e| TriggerError::InvalidPattern { rule: rule.name.clone(), reason: e.to_string() })?;
            Ok(Some(regex))
        }
        TriggerType::Keyword => Ok(None),
    }
}

/// Tokenizes `"/build {project}"` into `^\s*/build\s+(?<project>\S+)\s*$`, escaping
/// every literal character and matching inter-token whitespace loosely.
fn compile_command(pattern: &str) -> Result<Regex, String> {
    let mut out = String::from("^\\s*");
    let mut chars = pattern.chars().peekable();
    let mut last_was_token = false;

    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                name.push(c2);
            }
            if last_was_token {
                out.push_str("\\s+");
            }
            out.push_str(&format!("(?P<{name}>\\S+)"));
            last_was_token = true;
        } else if c.is_whitespace() {
            out.push_str("\\s+");
            last_was_token = false;
        } else {
            out.push_str(&regex::escape(&c.to_string()));
            last_was_token = true;
        }
    }
    out.push_str("\\s*$");
    Regex::new(&out).map_err(|e| e.to_string())
}

fn match_one(compiled: &CompiledRule, text: &str) -> Option<BTreeMap<String, String>> {
    match compiled.rule.kind {
        TriggerType::Command => {
            let regex = compiled.regex.as_ref()?;
            let captures = regex.captures(text)?;
            Some(named_captures(regex, &captures))
        }
        TriggerType::Pattern => {
            let regex = compiled.regex.as_ref()?;
            let captures = regex.captures(text)?;
            Some(named_captures(regex, &captures))
        }
        TriggerType::Keyword => {
            let lower = text.to_lowercase();
            compiled
                .rule
                .keywords
                .iter()
                .find(|kw| lower.contains(&kw.to_lowercase()))
                .map(|kw| BTreeMap::from([("keyword".to_string(), kw.clone())]))
        }
    }
}

fn named_captures(regex: &Regex, captures: &regex::Captures) -> BTreeMap<String, String> {
    regex
        .capture_names()
        .flatten()
        .filter_map(|name| captures.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(source: crate::model::MessageSource, text: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: "m1".into(),
            source,
            text: text.to_string(),
            sender_username: Some("alice".into()),
            sender_user_id: Some("u1".into()),
            channel_id: Some("c1".into()),
            channel_name: Some("general".into()),
            received_at: Utc::now(),
            metadata: BTreeMap::new(),
            raw_payload: None,
        }
    }

    fn rule(kind: TriggerType) -> TriggerRule {
        TriggerRule {
            name: "r1".into(),
            sources: vec![crate::model::MessageSource::Slack],
            kind,
            pattern: None,
            keywords: vec![],
            workflow_path: "demo.yaml".into(),
            parameter_template: BTreeMap::new(),
            response_template: None,
            cooldown: None,
            enabled: true,
        }
    }

    #[test]
    fn command_rule_captures_a_placeholder() {
        let mut r = rule(TriggerType::Command);
        r.pattern = Some("/build {project}".into());
        let matcher = TriggerMatcher::new(vec![r]).unwrap();

        let outcome = matcher.evaluate(&message(crate::model::MessageSource::Slack, "/build my-api"));
        match outcome {
            MatchOutcome::Matched(m) => assert_eq!(m.captures.get("project").unwrap(), "my-api"),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn pattern_rule_is_case_insensitive_and_extracts_named_groups() {
        let mut r = rule(TriggerType::Pattern);
        r.pattern = Some(r"deploy (?P<env>\w+)".to_string());
        let matcher = TriggerMatcher::new(vec![r]).unwrap();

        let outcome = matcher.evaluate(&message(crate::model::MessageSource::Slack, "please DEPLOY staging now"));
        match outcome {
            MatchOutcome::Matched(m) => assert_eq!(m.captures.get("env").unwrap(), "staging"),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn keyword_rule_returns_first_matching_keyword() {
        let mut r = rule(TriggerType::Keyword);
        r.keywords = vec!["ping".into(), "hello".into()];
        let matcher = TriggerMatcher::new(vec![r]).unwrap();

        let outcome = matcher.evaluate(&message(crate::model::MessageSource::Slack, "hello there, anyone around?"));
        match outcome {
            MatchOutcome::Matched(m) => assert_eq!(m.captures.get("keyword").unwrap(), "hello"),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn rule_on_cooldown_is_skipped_and_reported() {
        let mut r = rule(TriggerType::Keyword);
        r.keywords = vec!["ping".into()];
        r.cooldown = Some(Duration::from_secs(60));
        let matcher = TriggerMatcher::new(vec![r]).unwrap();

        let msg = message(crate::model::MessageSource::Slack, "ping");
        assert!(matches!(matcher.evaluate(&msg), MatchOutcome::Matched(_)));
        match matcher.evaluate(&msg) {
            MatchOutcome::Cooldown { rule_name, remaining } => {
                assert_eq!(rule_name, "r1");
                assert!(remaining <= Duration::from_secs(60));
            }
            other => panic!("expected a cooldown hit, got {other:?}"),
        }
    }

    #[test]
    fn disabled_rule_never_matches() {
        let mut r = rule(TriggerType::Keyword);
        r.keywords = vec!["ping".into()];
        r.enabled = false;
        let matcher = TriggerMatcher::new(vec![r]).unwrap();
        assert!(matches!(
            matcher.evaluate(&message(crate::model::MessageSource::Slack, "ping")),
            MatchOutcome::NoMatch
        ));
    }

    #[test]
    fn source_mismatch_never_matches() {
        let mut r = rule(TriggerType::Keyword);
        r.keywords = vec!["ping".into()];
        let matcher = TriggerMatcher::new(vec![r]).unwrap();
        assert!(matches!(
            matcher.evaluate(&message(crate::model::MessageSource::Telegram, "ping")),
            MatchOutcome::NoMatch
        ));
    }
}
