//! Forensic watermarking.
//!
//! [`text_only`] derives the stamp text; [`WatermarkCompositor`] tiles that
//! exact string across a page. Both go through the same function so the
//! text shown on a page and the text written to the audit log never drift.

pub mod compositor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::nonce::session_prefix;

pub use compositor::WatermarkCompositor;

/// Used when the policy enables nothing or no facts are available.
pub const FALLBACK_TEXT: &str = "CONFIDENTIAL";

const SEPARATOR: &str = " | ";

/// Which facts a document wants stamped onto its pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkPolicy {
    #[serde(default = "enabled")]
    pub show_ip: bool,
    #[serde(default = "enabled")]
    pub show_timestamp: bool,
    #[serde(default = "enabled")]
    pub show_session_id: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_text: Option<String>,
}

fn enabled() -> bool {
    true
}

impl Default for WatermarkPolicy {
    fn default() -> Self {
        Self {
            show_ip: true,
            show_timestamp: true,
            show_session_id: true,
            custom_text: None,
        }
    }
}

/// Session-identifying facts available when a page is delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFacts {
    pub client_ip: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
}

/// Visual parameters of the tiled overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatermarkStyle {
    /// 0.0 (invisible) to 1.0 (opaque).
    pub opacity: f32,
    /// `#rrggbb`.
    pub color: String,
    /// Integer upscale of the 8x8 glyphs.
    pub scale: u32,
    pub angle_degrees: f32,
    /// Horizontal space between repetitions, in pixels.
    pub tile_gap: u32,
    /// Distance between baselines of consecutive rows, in pixels.
    pub row_height: u32,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            opacity: 0.15,
            color: "#888888".into(),
            scale: 2,
            angle_degrees: -30.0,
            tile_gap: 48,
            row_height: 100,
        }
    }
}

/// Human-readable timestamp form used in stamps.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Derive the stamp text: enabled facts in fixed order (IP, time, session
/// prefix, custom text) joined with `" | "`.
pub fn text_only(facts: &SessionFacts, policy: &WatermarkPolicy) -> String {
    let mut parts = Vec::with_capacity(4);

    if policy.show_ip {
        if let Some(ip) = facts.client_ip.as_deref().filter(|ip| !ip.is_empty()) {
            parts.push(format!("IP: {ip}"));
        }
    }
    if policy.show_timestamp {
        if let Some(at) = facts.timestamp {
            parts.push(format!("Time: {}", format_timestamp(at)));
        }
    }
    if policy.show_session_id {
        if let Some(session) = facts.session_id.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("Session: {}", session_prefix(session)));
        }
    }
    if let Some(custom) = policy.custom_text.as_deref().filter(|t| !t.is_empty()) {
        parts.push(custom.to_string());
    }

    if parts.is_empty() {
        FALLBACK_TEXT.to_string()
    } else {
        parts.join(SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> SessionFacts {
        SessionFacts {
            client_ip: Some("1.2.3.4".into()),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0),
            session_id: Some("abcdef0123456789".into()),
        }
    }

    #[test]
    fn ip_and_session_only() {
        let policy = WatermarkPolicy {
            show_ip: true,
            show_timestamp: false,
            show_session_id: true,
            custom_text: None,
        };
        assert_eq!(text_only(&facts(), &policy), "IP: 1.2.3.4 | Session: abcdef01");
    }

    #[test]
    fn all_fields_in_fixed_order() {
        let policy = WatermarkPolicy {
            custom_text: Some("Internal".into()),
            ..WatermarkPolicy::default()
        };
        assert_eq!(
            text_only(&facts(), &policy),
            "IP: 1.2.3.4 | Time: 2023-11-14 22:13:20 UTC | Session: abcdef01 | Internal"
        );
    }

    #[test]
    fn falls_back_when_nothing_enabled() {
        let policy = WatermarkPolicy {
            show_ip: false,
            show_timestamp: false,
            show_session_id: false,
            custom_text: None,
        };
        assert_eq!(text_only(&facts(), &policy), FALLBACK_TEXT);
    }

    #[test]
    fn missing_facts_degrade_to_available_subset() {
        let sparse = SessionFacts {
            client_ip: Some(String::new()),
            timestamp: None,
            session_id: Some("abc".into()),
        };
        assert_eq!(
            text_only(&sparse, &WatermarkPolicy::default()),
            "Session: abc"
        );
        assert_eq!(
            text_only(&SessionFacts::default(), &WatermarkPolicy::default()),
            FALLBACK_TEXT
        );
    }

    #[test]
    fn policy_deserializes_from_camel_case() {
        let policy: WatermarkPolicy =
            serde_json::from_str(r#"{ "showIp": false, "customText": "Draft" }"#).unwrap();
        assert!(!policy.show_ip);
        assert!(policy.show_timestamp);
        assert_eq!(policy.custom_text.as_deref(), Some("Draft"));
    }
}
