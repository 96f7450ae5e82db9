//! Subscription pattern matching.
//!
//! Patterns are dotted `Resource.action` strings. Three forms match:
//! exact (`Patient.create`), suffix wildcard (`*.delete`) and prefix
//! wildcard (`Observation.*`). Any other shape never matches.

use crate::types::{WebhookEndpoint, WebhookEvent};

/// Returns `true` if `pattern` matches `event_type`.
pub fn pattern_matches(pattern: &str, event_type: &str) -> bool {
    if pattern == event_type {
        return true;
    }

    // `*.action` keeps the leading dot so `*.create` cannot match `Patient.recreate`
    if let Some(suffix) = pattern.strip_prefix('*')
        && suffix.starts_with('.')
    {
        return event_type.ends_with(suffix);
    }

    // `Resource.*` keeps the trailing dot so `Patient.*` cannot match `PatientLink.create`
    if let Some(prefix) = pattern.strip_suffix('*')
        && prefix.ends_with('.')
    {
        return event_type.starts_with(prefix);
    }

    false
}

/// Returns `true` if any of `patterns` matches `event_type`.
pub fn any_pattern_matches<S: AsRef<str>>(patterns: &[S], event_type: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| pattern_matches(pattern.as_ref(), event_type))
}

/// Returns `true` if the endpoint should receive the event: it is active,
/// belongs to the event's tenant and subscribes to the event type.
pub fn endpoint_matches(endpoint: &WebhookEndpoint, event: &WebhookEvent) -> bool {
    endpoint.is_active()
        && endpoint.tenant_id == event.tenant_id
        && any_pattern_matches(&endpoint.events, &event.event_type)
}
