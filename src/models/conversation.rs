use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::Message;

/// Rule governing automatic deletion of unsaved messages.
///
/// `Immediately` deletes messages the recipient has already seen, evaluated
/// on conversation exit. `OneDay` deletes by age, evaluated on exit and
/// whenever the policy is (re)applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionPolicy {
    #[serde(rename = "immediately")]
    Immediately,
    #[serde(rename = "1day")]
    OneDay,
}

impl RetentionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionPolicy::Immediately => "immediately",
            RetentionPolicy::OneDay => "1day",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "immediately" => Some(RetentionPolicy::Immediately),
            "1day" => Some(RetentionPolicy::OneDay),
            _ => None,
        }
    }

    /// Pure deletion predicate, independent of the data layer.
    ///
    /// A saved message is never eligible, regardless of read state or age.
    /// The `is_saved` flag is global to the message: either participant's
    /// save protects it from the other participant's retention.
    pub fn eligible_for_deletion(&self, message: &Message, now: DateTime<Utc>) -> bool {
        if message.is_saved {
            return false;
        }
        match self {
            RetentionPolicy::Immediately => message.read_at.is_some(),
            RetentionPolicy::OneDay => now - message.created_at >= Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub retention_policy: RetentionPolicy,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// The participant on the other side of the conversation.
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.participant_a == user_id {
            Some(self.participant_b)
        } else if self.participant_b == user_id {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(is_saved: bool, read: bool, age_hours: i64, now: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hi".into(),
            created_at: now - Duration::hours(age_hours),
            read_at: read.then_some(now),
            is_saved,
            tags: vec![],
        }
    }

    #[test]
    fn test_immediately_deletes_only_read_messages() {
        let now = Utc::now();
        let policy = RetentionPolicy::Immediately;

        assert!(policy.eligible_for_deletion(&message(false, true, 0, now), now));
        assert!(!policy.eligible_for_deletion(&message(false, false, 0, now), now));
    }

    #[test]
    fn test_saved_message_is_never_eligible() {
        let now = Utc::now();

        let saved_and_read = message(true, true, 48, now);
        assert!(!RetentionPolicy::Immediately.eligible_for_deletion(&saved_and_read, now));
        assert!(!RetentionPolicy::OneDay.eligible_for_deletion(&saved_and_read, now));
    }

    #[test]
    fn test_one_day_is_age_based() {
        let now = Utc::now();
        let policy = RetentionPolicy::OneDay;

        assert!(!policy.eligible_for_deletion(&message(false, false, 23, now), now));
        assert!(policy.eligible_for_deletion(&message(false, false, 25, now), now));
        // Read state is irrelevant for the age-based policy
        assert!(policy.eligible_for_deletion(&message(false, true, 25, now), now));
    }

    #[test]
    fn test_policy_round_trips_through_strings() {
        assert_eq!(
            RetentionPolicy::parse("immediately"),
            Some(RetentionPolicy::Immediately)
        );
        assert_eq!(RetentionPolicy::parse("1day"), Some(RetentionPolicy::OneDay));
        assert_eq!(RetentionPolicy::parse("forever"), None);
        assert_eq!(RetentionPolicy::OneDay.as_str(), "1day");
    }

    #[test]
    fn test_peer_of() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let convo = Conversation {
            id: Uuid::new_v4(),
            participant_a: a,
            participant_b: b,
            last_message: None,
            last_message_at: None,
            retention_policy: RetentionPolicy::OneDay,
            created_at: Utc::now(),
        };

        assert_eq!(convo.peer_of(a), Some(b));
        assert_eq!(convo.peer_of(b), Some(a));
        assert_eq!(convo.peer_of(Uuid::new_v4()), None);
        assert!(convo.is_participant(a) && convo.is_participant(b));
    }
}
