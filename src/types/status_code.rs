use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Protocol status code. The top two bits carry severity (00 good, 01 uncertain, 10 bad).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

macro_rules! status_codes {
    ($($name:ident = $value:expr),+ $(,)?) => {
        impl StatusCode {
            $(
                #[allow(non_upper_case_globals)]
                pub const $name: StatusCode = StatusCode($value);
            )+

            /// Symbolic name of a known code.
            pub fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)+
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    Good = 0x0000_0000,
    UncertainInitialValue = 0x4092_0000,
    BadUnexpectedError = 0x8001_0000,
    BadInternalError = 0x8002_0000,
    BadDecodingError = 0x8007_0000,
    BadTimeout = 0x800A_0000,
    BadServiceUnsupported = 0x800B_0000,
    BadShutdown = 0x800C_0000,
    BadNothingToDo = 0x800F_0000,
    BadTooManyOperations = 0x8010_0000,
    BadSecurityChecksFailed = 0x8013_0000,
    BadIdentityTokenInvalid = 0x8020_0000,
    BadSecureChannelIdInvalid = 0x8022_0000,
    BadSessionIdInvalid = 0x8025_0000,
    BadSessionClosed = 0x8026_0000,
    BadSessionNotActivated = 0x8027_0000,
    BadSubscriptionIdInvalid = 0x8028_0000,
    BadRequestHeaderInvalid = 0x802A_0000,
    BadNodeIdInvalid = 0x8033_0000,
    BadNodeIdUnknown = 0x8034_0000,
    BadAttributeIdInvalid = 0x8035_0000,
    BadNotReadable = 0x803A_0000,
    BadNotWritable = 0x803B_0000,
    BadMonitoredItemIdInvalid = 0x8042_0000,
    BadTooManySessions = 0x8056_0000,
    BadNodeIdExists = 0x805E_0000,
    BadTypeMismatch = 0x8074_0000,
    BadTooManySubscriptions = 0x8077_0000,
    BadTooManyPublishRequests = 0x8078_0000,
    BadNoSubscription = 0x8079_0000,
    BadSequenceNumberUnknown = 0x807A_0000,
    BadMessageNotAvailable = 0x807B_0000,
    BadTcpMessageTypeInvalid = 0x807E_0000,
    BadTcpMessageTooLarge = 0x8080_0000,
    BadTcpNotEnoughResources = 0x8081_0000,
    BadTcpEndpointUrlInvalid = 0x8083_0000,
    BadSecureChannelClosed = 0x8086_0000,
    BadSecureChannelTokenUnknown = 0x8087_0000,
    BadSecurityPolicyRejected = 0x8055_0000,
    BadTooManyMonitoredItems = 0x80DB_0000,
}

impl StatusCode {
    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Good
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}
