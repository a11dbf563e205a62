use crate::ChannelError;
use crate::MessageSecurityMode;
use crate::SECURITY_POLICY_NONE_URI;

/// Security policy negotiated when a channel is opened.
///
/// Only `None` is implemented. Signing policies become new variants; the channel
/// and session contracts only ever see the resolved policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicy {
    None,
}

impl SecurityPolicy {
    pub fn from_uri(uri: &str) -> Result<Self, ChannelError> {
        match uri {
            SECURITY_POLICY_NONE_URI | "" => Ok(SecurityPolicy::None),
            other => Err(ChannelError::SecurityPolicyRejected(other.to_string())),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE_URI,
        }
    }

    pub fn supports_mode(
        &self,
        mode: MessageSecurityMode,
    ) -> bool {
        match self {
            SecurityPolicy::None => mode == MessageSecurityMode::None,
        }
    }
}
