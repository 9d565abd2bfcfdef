//! Metered usage: SMS segments and voice minutes.
//!
//! Requests are turned into billable units here; pricing happens elsewhere.

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// Characters per SMS segment.
pub const SMS_SEGMENT_LENGTH: u64 = 153;

/// Seconds per billed voice minute.
const SECONDS_PER_MINUTE: u64 = 60;

/// The kinds of usage that consume credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    /// Text messages, billed per segment per recipient.
    Sms,
    /// Voice calls, billed per minute per recipient.
    Voice,
}

impl UsageType {
    /// Get the usage type name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Voice => "voice",
        }
    }
}

impl std::fmt::Display for UsageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of segments needed to send a message of `message_length` characters.
#[must_use]
pub const fn segment_count(message_length: u64) -> u64 {
    message_length.div_ceil(SMS_SEGMENT_LENGTH)
}

/// An SMS campaign: one message sent to a number of recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsUsage {
    /// Message length in characters.
    pub message_length: u64,
    /// Number of recipients.
    pub recipients: u64,
}

impl SmsUsage {
    /// Describe sending `message` to `recipients` recipients.
    #[must_use]
    pub fn for_message(message: &str, recipients: u64) -> Self {
        Self {
            message_length: message.chars().count() as u64,
            recipients,
        }
    }

    /// Segments per recipient.
    #[must_use]
    pub const fn segments(&self) -> u64 {
        segment_count(self.message_length)
    }

    /// Billable units: segments times recipients.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidUsage`] for an empty message, no
    /// recipients, or a unit count that does not fit in a `u64`.
    pub fn units(&self) -> Result<u64> {
        if self.message_length == 0 {
            return Err(BillingError::InvalidUsage("message is empty".into()));
        }
        if self.recipients == 0 {
            return Err(BillingError::InvalidUsage("no recipients".into()));
        }
        self.segments()
            .checked_mul(self.recipients)
            .ok_or_else(|| BillingError::InvalidUsage("too many SMS units".into()))
    }
}

/// A voice campaign: a call of a given length placed to a number of recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceUsage {
    /// Call length in whole minutes.
    pub call_minutes: u64,
    /// Number of recipients.
    pub recipients: u64,
}

impl VoiceUsage {
    /// Describe a call of `seconds` seconds, rounded up to whole minutes.
    #[must_use]
    pub const fn from_seconds(seconds: u64, recipients: u64) -> Self {
        Self {
            call_minutes: seconds.div_ceil(SECONDS_PER_MINUTE),
            recipients,
        }
    }

    /// Billable units: minutes times recipients.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidUsage`] for a zero-length call, no
    /// recipients, or a unit count that does not fit in a `u64`.
    pub fn units(&self) -> Result<u64> {
        if self.call_minutes == 0 {
            return Err(BillingError::InvalidUsage("call length is zero".into()));
        }
        if self.recipients == 0 {
            return Err(BillingError::InvalidUsage("no recipients".into()));
        }
        self.call_minutes
            .checked_mul(self.recipients)
            .ok_or_else(|| BillingError::InvalidUsage("too many voice units".into()))
    }
}

/// A usage request of either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MeteredUsage {
    /// SMS campaign.
    Sms(SmsUsage),
    /// Voice campaign.
    Voice(VoiceUsage),
}

impl MeteredUsage {
    /// The usage type being requested.
    #[must_use]
    pub const fn usage_type(&self) -> UsageType {
        match self {
            Self::Sms(_) => UsageType::Sms,
            Self::Voice(_) => UsageType::Voice,
        }
    }

    /// Billable units for the request.
    ///
    /// # Errors
    ///
    /// See [`SmsUsage::units`] and [`VoiceUsage::units`].
    pub fn units(&self) -> Result<u64> {
        match self {
            Self::Sms(sms) => sms.units(),
            Self::Voice(voice) => voice.units(),
        }
    }
}

impl From<SmsUsage> for MeteredUsage {
    fn from(sms: SmsUsage) -> Self {
        Self::Sms(sms)
    }
}

impl From<VoiceUsage> for MeteredUsage {
    fn from(voice: VoiceUsage) -> Self {
        Self::Voice(voice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_boundaries() {
        assert_eq!(segment_count(0), 0);
        assert_eq!(segment_count(1), 1);
        assert_eq!(segment_count(153), 1);
        assert_eq!(segment_count(154), 2);
        assert_eq!(segment_count(306), 2);
        assert_eq!(segment_count(307), 3);
    }

    #[test]
    fn sms_units_scale_with_recipients() {
        let one = SmsUsage {
            message_length: 200,
            recipients: 1,
        };
        assert_eq!(one.units().unwrap(), 2);

        for recipients in 1..=20 {
            let sms = SmsUsage {
                message_length: 200,
                recipients,
            };
            assert_eq!(sms.units().unwrap(), 2 * recipients);
        }
    }

    #[test]
    fn sms_counts_characters_not_bytes() {
        let message = "é".repeat(153);
        let sms = SmsUsage::for_message(&message, 3);
        assert_eq!(sms.message_length, 153);
        assert_eq!(sms.units().unwrap(), 3);
    }

    #[test]
    fn sms_rejects_empty_message_and_no_recipients() {
        assert!(matches!(
            SmsUsage::for_message("", 5).units(),
            Err(BillingError::InvalidUsage(_))
        ));
        assert!(matches!(
            SmsUsage::for_message("hi", 0).units(),
            Err(BillingError::InvalidUsage(_))
        ));
    }

    #[test]
    fn voice_units_and_rounding() {
        let voice = VoiceUsage {
            call_minutes: 3,
            recipients: 4,
        };
        assert_eq!(voice.units().unwrap(), 12);

        assert_eq!(VoiceUsage::from_seconds(60, 1).call_minutes, 1);
        assert_eq!(VoiceUsage::from_seconds(61, 1).call_minutes, 2);
        assert!(VoiceUsage::from_seconds(0, 1).units().is_err());
    }

    #[test]
    fn overflowing_units_are_rejected() {
        let voice = VoiceUsage {
            call_minutes: u64::MAX,
            recipients: 2,
        };
        assert!(matches!(voice.units(), Err(BillingError::InvalidUsage(_))));
    }

    #[test]
    fn metered_usage_dispatch() {
        let usage = MeteredUsage::from(VoiceUsage {
            call_minutes: 2,
            recipients: 5,
        });
        assert_eq!(usage.usage_type(), UsageType::Voice);
        assert_eq!(usage.units().unwrap(), 10);

        let json = serde_json::to_value(MeteredUsage::from(SmsUsage {
            message_length: 10,
            recipients: 1,
        }))
        .unwrap();
        assert_eq!(json["type"], "sms");
    }
}
