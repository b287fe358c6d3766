use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumString};

/// The name of one flow state, as spoken on the wire.
///
/// The server is free to introduce state names this SDK does not know about;
/// those round-trip through [`StateName::Other`] so the engine stays total
/// over any document it is handed. Auto-step membership is decided per
/// variant, which makes adding an auto-steppable state a compile-time-checked
/// table entry rather than a string-keyed property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StateName {
    /// Client capability negotiation; runs before any interactive state.
    Preflight,
    /// Entry state of the login flow, asking for a login identifier.
    LoginInit,
    /// Credential-creation ceremony (platform authenticator registration).
    PasskeyCreate,
    /// Credential-assertion ceremony (platform authenticator login).
    PasskeyVerify,
    /// Handoff to a third-party identity provider.
    Thirdparty,
    /// Terminal state of a completed flow.
    Success,
    /// Terminal state after account deletion.
    AccountDeleted,
    /// Flow-level error state.
    Error,
    /// Any state name this SDK has no special handling for.
    #[strum(default)]
    Other(String),
}

impl Serialize for StateName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
