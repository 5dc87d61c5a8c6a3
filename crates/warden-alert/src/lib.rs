//! warden-alert — escalating, rate-limited alerts for Warden.
//!
//! # Architecture
//!
//! ```text
//! EscalationEngine::evaluate(service, priority, sample, downtime)
//!   ├── escalation_level()      priority × downtime → info..emergency
//!   ├── one redb write txn      silence check → hourly limit → count + auto-silence
//!   ├── Notifier::send()        log or webhook, after commit
//!   └── AlertRecord appended    sent = delivery result
//! ```
//!
//! Silence is checked before the rate limit, so a silenced service never
//! consumes its hourly budget. Each sent alert overwrites the service's
//! silence with the level's duration.

pub mod escalation;
pub mod notify;

pub use escalation::{AlertDecision, EscalationEngine, escalation_level};
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
