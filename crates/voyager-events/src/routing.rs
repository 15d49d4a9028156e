//! Type-prefix to topic routing table.

/// Resolves an event's type discriminator to its logical topic name, per
/// the routing table. The topic is not yet fully-qualified — the producer
/// prepends its configured `topicPrefix`.
pub fn topic_for(event_type: &str) -> &'static str {
    match event_type {
        "instrument.measurement" => "measurements",
        "instrument.alert" => "alerts",
        "instrument.lifecycle" => "instrument-commands",
        other if other.starts_with("action.") => "actions",
        other if other.starts_with("task.") => "tasks",
        other if other.starts_with("workflow.") => "tasks",
        other if other.starts_with("session.") => "sessions",
        other if other.starts_with("detection.") => "detections",
        other if other.starts_with("behavioral.") => "anomalies",
        _ => "measurements",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matches_route_correctly() {
        assert_eq!(topic_for("instrument.measurement"), "measurements");
        assert_eq!(topic_for("instrument.alert"), "alerts");
        assert_eq!(topic_for("instrument.lifecycle"), "instrument-commands");
    }

    #[test]
    fn prefix_matches_route_correctly() {
        assert_eq!(topic_for("action.click"), "actions");
        assert_eq!(topic_for("task.transition"), "tasks");
        assert_eq!(topic_for("workflow.started"), "tasks");
        assert_eq!(topic_for("session.opened"), "sessions");
        assert_eq!(topic_for("detection.bot"), "detections");
        assert_eq!(topic_for("behavioral.mouse"), "anomalies");
    }

    #[test]
    fn unknown_prefix_falls_back_to_measurements() {
        assert_eq!(topic_for("unrecognized.whatever"), "measurements");
    }
}
