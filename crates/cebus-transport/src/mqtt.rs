//! Mapping of bus topics and patterns onto MQTT.
//!
//! Each topic segment becomes one MQTT level, a pattern's `*` becomes `+`,
//! and subscriptions are shared under the consumer group:
//! `^sourceevents.*.cluster7` → `$share/<group>/sourceevents/+/cluster7`.

use crate::error::TransportError;
use cebus_proto::topics::{PatternLevel, SEPARATOR, WILDCARD};
use cebus_proto::{SubscriptionPattern, Topic};

const LEVEL_SEPARATOR: char = '/';
const SINGLE_LEVEL_WILDCARD: &str = "+";
const RESERVED: [char; 3] = ['/', '+', '#'];

/// MQTT topic name for a concrete bus topic.
///
/// # Errors
///
/// Returns error if a segment is a wildcard or contains an MQTT
/// separator or wildcard character.
pub fn topic_name(topic: &Topic) -> Result<String, TransportError> {
    for level in topic.levels() {
        check_level(level, &topic.name())?;
        if level == WILDCARD {
            return Err(TransportError::InvalidTopic(format!(
                "{topic}: wildcard segment in a publish topic"
            )));
        }
    }
    Ok(topic.levels().join(&LEVEL_SEPARATOR.to_string()))
}

/// MQTT shared-subscription filter for a subscription pattern.
///
/// # Errors
///
/// Returns error if a literal level contains an MQTT separator or
/// wildcard character.
pub fn subscription_filter(
    pattern: &SubscriptionPattern,
    group_id: &str,
) -> Result<String, TransportError> {
    let levels = pattern
        .levels()
        .iter()
        .map(|level| match level {
            PatternLevel::Exact(literal) => {
                check_level(literal, &pattern.to_string()).map(|()| literal.as_str())
            }
            PatternLevel::Any => Ok(SINGLE_LEVEL_WILDCARD),
        })
        .collect::<Result<Vec<_>, TransportError>>()?;

    Ok(format!(
        "$share/{group_id}/{}",
        levels.join(&LEVEL_SEPARATOR.to_string())
    ))
}

/// Bus topic name for a received MQTT topic.
#[must_use]
pub fn bus_topic(mqtt_topic: &str) -> String {
    mqtt_topic.replace(LEVEL_SEPARATOR, &SEPARATOR.to_string())
}

fn check_level(level: &str, whole: &str) -> Result<(), TransportError> {
    if level.is_empty() {
        return Err(TransportError::InvalidTopic(format!("{whole}: empty level")));
    }
    if level.contains(RESERVED) {
        return Err(TransportError::InvalidTopic(format!(
            "{whole}: '{level}' contains '/', '+' or '#'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cebus_proto::TopicScheme;

    #[test]
    fn topic_levels_become_mqtt_levels() {
        let topic = TopicScheme::default()
            .agent_events("hub", "cluster7")
            .unwrap();
        assert_eq!(topic_name(&topic).unwrap(), "agentevents/hub/cluster7");
    }

    #[test]
    fn wildcard_topic_cannot_be_published() {
        let topic = TopicScheme::default().agent_events("*", "cluster7").unwrap();
        assert!(matches!(
            topic_name(&topic),
            Err(TransportError::InvalidTopic(_))
        ));
    }

    #[test]
    fn reserved_characters_rejected() {
        let topic = TopicScheme::default()
            .agent_events("hub/1", "cluster7")
            .unwrap();
        assert!(matches!(
            topic_name(&topic),
            Err(TransportError::InvalidTopic(_))
        ));
    }

    #[test]
    fn shared_subscription_filters() {
        let filters: Vec<String> = TopicScheme::default()
            .agent_subscriptions("cluster7")
            .iter()
            .map(|pattern| subscription_filter(pattern, "agent-1").unwrap())
            .collect();

        assert_eq!(
            filters,
            vec![
                "$share/agent-1/sourceevents/+/cluster7",
                "$share/agent-1/sourcebroadcast/+",
            ]
        );
    }

    #[test]
    fn pattern_with_reserved_literal_rejected() {
        let patterns = TopicScheme::default().agent_subscriptions("cluster#7");
        assert!(matches!(
            subscription_filter(&patterns[0], "agent-1"),
            Err(TransportError::InvalidTopic(_))
        ));
    }

    #[test]
    fn received_topic_maps_back() {
        assert_eq!(bus_topic("sourceevents/hub/cluster7"), "sourceevents.hub.cluster7");
    }
}
