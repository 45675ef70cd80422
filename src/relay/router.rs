use std::collections::HashMap;

use crate::config::RoutingConfig;

/// Maps an event type to a broker topic.
///
/// Resolution order: an explicit entry for the exact type, then the first
/// rule whose token occurs in the type (case-insensitive), then the default.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    default_topic: String,
    rules: Vec<(String, String)>,
    explicit: HashMap<String, String>,
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::from_config(&RoutingConfig::default())
    }
}

impl TopicRouter {
    /// A router with no rules: everything goes to `default_topic`.
    pub fn new(default_topic: impl Into<String>) -> Self {
        Self {
            default_topic: default_topic.into(),
            rules: Vec::new(),
            explicit: HashMap::new(),
        }
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        let mut router = Self::new(config.default_topic.clone());
        for rule in &config.rules {
            router = router.with_rule(&rule.token, &rule.topic);
        }
        for (event_type, topic) in &config.explicit {
            router = router.with_explicit(event_type, topic);
        }
        router
    }

    /// Append a substring rule; earlier rules take precedence.
    pub fn with_rule(mut self, token: impl AsRef<str>, topic: impl Into<String>) -> Self {
        self.rules
            .push((token.as_ref().to_lowercase(), topic.into()));
        self
    }

    pub fn with_explicit(mut self, event_type: impl Into<String>, topic: impl Into<String>) -> Self {
        self.explicit.insert(event_type.into(), topic.into());
        self
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    pub fn route(&self, event_type: &str) -> &str {
        if let Some(topic) = self.explicit.get(event_type) {
            return topic;
        }
        let lowered = event_type.to_lowercase();
        self.rules
            .iter()
            .find(|(token, _)| lowered.contains(token.as_str()))
            .map(|(_, topic)| topic.as_str())
            .unwrap_or(self.default_topic.as_str())
    }
}
