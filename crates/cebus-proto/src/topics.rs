//! Topic templates for agent/hub addressing.
//!
//! Four role templates make up the naming contract with the hub:
//!
//! | Role | Template |
//! |---|---|
//! | source events | `sourceevents.{source}.{cluster}` |
//! | agent events | `agentevents.{source}.{cluster}` |
//! | source broadcast | `sourcebroadcast.{source}` |
//! | agent broadcast | `agentbroadcast.{cluster}` |
//!
//! Placeholders are bound by name. A placeholder that is still unbound
//! renders as `*`, which subscription patterns treat as "any segment".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Segment separator in topic names.
pub const SEPARATOR: char = '.';

/// Rendering of an unbound placeholder.
pub const WILDCARD: &str = "*";

/// Prefix marking a subscription as a pattern rather than an exact topic.
pub const PATTERN_ANCHOR: char = '^';

/// Template for source events addressed to one cluster.
pub const SOURCE_EVENTS_TEMPLATE: &str = "sourceevents.{source}.{cluster}";

/// Template for agent events addressed to one source.
pub const AGENT_EVENTS_TEMPLATE: &str = "agentevents.{source}.{cluster}";

/// Template for source events addressed to all clusters.
pub const SOURCE_BROADCAST_TEMPLATE: &str = "sourcebroadcast.{source}";

/// Template for agent events addressed to all sources.
pub const AGENT_BROADCAST_TEMPLATE: &str = "agentbroadcast.{cluster}";

/// Fixed pattern matching every source's broadcasts.
///
/// Hub broadcasts always live under one well-known pattern, so this stays a
/// literal rather than being derived from [`SOURCE_BROADCAST_TEMPLATE`].
pub const SOURCE_BROADCAST_PATTERN: &str = "^sourcebroadcast.*";

/// Fixed pattern matching every agent's broadcasts.
pub const AGENT_BROADCAST_PATTERN: &str = "^agentbroadcast.*";

/// Named placeholder inside a topic template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    /// Identity of the source (hub) side
    Source,
    /// Identity of the cluster (agent) side
    Cluster,
}

impl Placeholder {
    /// Name used inside braces in template text.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Cluster => "cluster",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "source" => Some(Self::Source),
            "cluster" => Some(Self::Cluster),
            _ => None,
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A topic name with named placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    segments: Vec<Segment>,
}

impl TopicTemplate {
    /// Parse template text such as `agentevents.{source}.{cluster}`.
    ///
    /// # Errors
    ///
    /// Returns error on empty segments, unknown placeholder names, or a
    /// placeholder used twice.
    pub fn parse(text: &str) -> Result<Self, TopicError> {
        let mut segments = Vec::new();

        for part in text.split(SEPARATOR) {
            if part.is_empty() {
                return Err(TopicError::EmptySegment(text.to_string()));
            }

            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => {
                    let placeholder = Placeholder::from_name(name)
                        .ok_or_else(|| TopicError::UnknownPlaceholder(name.to_string()))?;
                    if segments.contains(&Segment::Slot(placeholder)) {
                        return Err(TopicError::DuplicatePlaceholder(placeholder));
                    }
                    Segment::Slot(placeholder)
                }
                None => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// Bind a placeholder to an identity.
    ///
    /// Returns the template unchanged when the placeholder is absent or
    /// already bound, so substitution is idempotent.
    #[must_use]
    pub fn substitute(&self, placeholder: Placeholder, identity: &str) -> Self {
        let mut segments = self.segments.clone();
        if let Some(slot) = segments
            .iter_mut()
            .find(|segment| **segment == Segment::Slot(placeholder))
        {
            *slot = Segment::Literal(identity.to_string());
        }
        Self { segments }
    }

    /// Placeholders that are still unbound, in template order.
    #[must_use]
    pub fn placeholders(&self) -> Vec<Placeholder> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Slot(placeholder) => Some(*placeholder),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Render the template, unbound placeholders as `*`.
    #[must_use]
    pub fn render(&self) -> String {
        self.levels().join(&SEPARATOR.to_string())
    }

    /// Turn the template into an anchored subscription pattern.
    #[must_use]
    pub fn as_subscription_pattern(&self) -> SubscriptionPattern {
        SubscriptionPattern {
            levels: self
                .segments
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(literal) => PatternLevel::Exact(literal.clone()),
                    Segment::Slot(_) => PatternLevel::Any,
                })
                .collect(),
        }
    }

    /// Turn a fully bound template into a concrete topic.
    ///
    /// # Errors
    ///
    /// Returns error if a placeholder is still unbound.
    pub fn to_topic(&self) -> Result<Topic, TopicError> {
        let levels = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => Ok(literal.clone()),
                Segment::Slot(placeholder) => Err(TopicError::Unbound(*placeholder)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Topic { levels })
    }

    /// Match a concrete topic against the template, capturing placeholders.
    fn capture(&self, topic: &str) -> Option<Vec<(Placeholder, String)>> {
        let parts: Vec<&str> = topic.split(SEPARATOR).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut captured = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Slot(_) if part.is_empty() => return None,
                Segment::Slot(placeholder) => captured.push((*placeholder, part.to_string())),
            }
        }
        Some(captured)
    }

    fn levels(&self) -> Vec<String> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => literal.clone(),
                Segment::Slot(_) => WILDCARD.to_string(),
            })
            .collect()
    }
}

impl FromStr for TopicTemplate {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TopicTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => literal.clone(),
                Segment::Slot(placeholder) => placeholder.to_string(),
            })
            .collect();
        f.write_str(&text.join(&SEPARATOR.to_string()))
    }
}

/// A concrete topic to publish on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    levels: Vec<String>,
}

impl Topic {
    /// Topic segments in order.
    #[must_use]
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Topic name with `.` separators.
    #[must_use]
    pub fn name(&self) -> String {
        self.levels.join(&SEPARATOR.to_string())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One level of a subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternLevel {
    /// Must equal the topic segment
    Exact(String),
    /// Matches any single non-empty segment
    Any,
}

/// Anchored subscription pattern, displayed as `^level.level...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionPattern {
    levels: Vec<PatternLevel>,
}

impl SubscriptionPattern {
    /// Parse an anchored pattern such as `^sourcebroadcast.*`.
    ///
    /// # Errors
    ///
    /// Returns error if the anchor is missing or a level is empty.
    pub fn parse(text: &str) -> Result<Self, TopicError> {
        let body = text
            .strip_prefix(PATTERN_ANCHOR)
            .ok_or_else(|| TopicError::MissingAnchor(text.to_string()))?;

        let levels = body
            .split(SEPARATOR)
            .map(|part| match part {
                "" => Err(TopicError::EmptySegment(text.to_string())),
                WILDCARD => Ok(PatternLevel::Any),
                literal => Ok(PatternLevel::Exact(literal.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { levels })
    }

    /// Pattern levels in order.
    #[must_use]
    pub fn levels(&self) -> &[PatternLevel] {
        &self.levels
    }

    /// Whether a concrete topic name matches this pattern.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        let parts: Vec<&str> = topic.split(SEPARATOR).collect();
        parts.len() == self.levels.len()
            && self.levels.iter().zip(parts).all(|(level, part)| match level {
                PatternLevel::Exact(literal) => literal == part,
                PatternLevel::Any => !part.is_empty(),
            })
    }
}

impl FromStr for SubscriptionPattern {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SubscriptionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels: Vec<&str> = self
            .levels
            .iter()
            .map(|level| match level {
                PatternLevel::Exact(literal) => literal.as_str(),
                PatternLevel::Any => WILDCARD,
            })
            .collect();
        write!(f, "{PATTERN_ANCHOR}{}", levels.join(&SEPARATOR.to_string()))
    }
}

/// Routing role a topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicRole {
    /// Source to one cluster
    SourceEvents,
    /// Agent to one source
    AgentEvents,
    /// Source to all clusters
    SourceBroadcast,
    /// Agent to all sources
    AgentBroadcast,
}

/// Components of a parsed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    /// Role of the topic
    pub role: TopicRole,
    /// Source identity, if the role carries one
    pub source: Option<String>,
    /// Cluster identity, if the role carries one
    pub cluster: Option<String>,
}

/// The four role templates shared by agents and hubs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    /// Source events template
    pub source_events: TopicTemplate,
    /// Agent events template
    pub agent_events: TopicTemplate,
    /// Source broadcast template
    pub source_broadcast: TopicTemplate,
    /// Agent broadcast template
    pub agent_broadcast: TopicTemplate,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            source_events: builtin(SOURCE_EVENTS_TEMPLATE),
            agent_events: builtin(AGENT_EVENTS_TEMPLATE),
            source_broadcast: builtin(SOURCE_BROADCAST_TEMPLATE),
            agent_broadcast: builtin(AGENT_BROADCAST_TEMPLATE),
        }
    }
}

fn builtin(text: &str) -> TopicTemplate {
    match TopicTemplate::parse(text) {
        Ok(template) => template,
        Err(err) => unreachable!("built-in template {text} is invalid: {err}"),
    }
}

fn fixed_pattern(text: &str) -> SubscriptionPattern {
    match SubscriptionPattern::parse(text) {
        Ok(pattern) => pattern,
        Err(err) => unreachable!("built-in pattern {text} is invalid: {err}"),
    }
}

impl TopicScheme {
    /// Topic for an agent broadcast from `cluster`.
    ///
    /// # Errors
    ///
    /// Returns error if the template has placeholders other than `{cluster}`.
    pub fn agent_broadcast(&self, cluster: &str) -> Result<Topic, TopicError> {
        self.agent_broadcast
            .substitute(Placeholder::Cluster, cluster)
            .to_topic()
    }

    /// Topic for agent events from `cluster` to `source`.
    ///
    /// # Errors
    ///
    /// Returns error if the template has placeholders left unbound.
    pub fn agent_events(&self, source: &str, cluster: &str) -> Result<Topic, TopicError> {
        self.agent_events
            .substitute(Placeholder::Source, source)
            .substitute(Placeholder::Cluster, cluster)
            .to_topic()
    }

    /// Topic for a source broadcast from `source`.
    ///
    /// # Errors
    ///
    /// Returns error if the template has placeholders other than `{source}`.
    pub fn source_broadcast(&self, source: &str) -> Result<Topic, TopicError> {
        self.source_broadcast
            .substitute(Placeholder::Source, source)
            .to_topic()
    }

    /// Topic for source events from `source` to `cluster`.
    ///
    /// # Errors
    ///
    /// Returns error if the template has placeholders left unbound.
    pub fn source_events(&self, source: &str, cluster: &str) -> Result<Topic, TopicError> {
        self.source_events
            .substitute(Placeholder::Source, source)
            .substitute(Placeholder::Cluster, cluster)
            .to_topic()
    }

    /// Everything an agent for `cluster` must receive.
    #[must_use]
    pub fn agent_subscriptions(&self, cluster: &str) -> Vec<SubscriptionPattern> {
        vec![
            self.source_events
                .substitute(Placeholder::Cluster, cluster)
                .as_subscription_pattern(),
            fixed_pattern(SOURCE_BROADCAST_PATTERN),
        ]
    }

    /// Everything a hub acting as `source` must receive.
    #[must_use]
    pub fn source_subscriptions(&self, source: &str) -> Vec<SubscriptionPattern> {
        vec![
            self.agent_events
                .substitute(Placeholder::Source, source)
                .as_subscription_pattern(),
            fixed_pattern(AGENT_BROADCAST_PATTERN),
        ]
    }

    /// Parse a topic to find its role and identities.
    #[must_use]
    pub fn parse(&self, topic: &str) -> Option<ParsedTopic> {
        let roles = [
            (TopicRole::SourceEvents, &self.source_events),
            (TopicRole::AgentEvents, &self.agent_events),
            (TopicRole::SourceBroadcast, &self.source_broadcast),
            (TopicRole::AgentBroadcast, &self.agent_broadcast),
        ];

        roles.into_iter().find_map(|(role, template)| {
            let captured = template.capture(topic)?;
            let lookup = |wanted: Placeholder| {
                captured
                    .iter()
                    .find(|(placeholder, _)| *placeholder == wanted)
                    .map(|(_, value)| value.clone())
            };
            Some(ParsedTopic {
                role,
                source: lookup(Placeholder::Source),
                cluster: lookup(Placeholder::Cluster),
            })
        })
    }
}

/// Errors for topic templates and patterns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// A segment was empty
    #[error("empty segment in topic: {0}")]
    EmptySegment(String),
    /// Placeholder name is not known
    #[error("unknown placeholder: {{{0}}}")]
    UnknownPlaceholder(String),
    /// Placeholder appears twice
    #[error("placeholder {0} used more than once")]
    DuplicatePlaceholder(Placeholder),
    /// Concrete topic requested with a placeholder still open
    #[error("placeholder {0} is not bound")]
    Unbound(Placeholder),
    /// Pattern is missing its anchor prefix
    #[error("subscription pattern must start with '^': {0}")]
    MissingAnchor(String),
}
