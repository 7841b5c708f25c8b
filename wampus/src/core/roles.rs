/// A role a client session can take on in a realm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerRole {
    // Calls procedures.
    Caller,
    // Registers procedures.
    Callee,
    // Publishes events to topics.
    Publisher,
    // Subscribes to topics.
    Subscriber,
}

impl PeerRole {
    /// Feature flags advertised for the role in HELLO.
    pub fn features(&self) -> &'static [&'static str] {
        match self {
            Self::Caller | Self::Callee => &["call_canceling", "progressive_call_results"],
            Self::Publisher => &["publisher_exclusion", "subscriber_blackwhite_listing"],
            Self::Subscriber => &["pattern_based_subscription"],
        }
    }
}

impl TryFrom<&str> for PeerRole {
    type Error = anyhow::Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "caller" => Ok(Self::Caller),
            "callee" => Ok(Self::Callee),
            "publisher" => Ok(Self::Publisher),
            "subscriber" => Ok(Self::Subscriber),
            _ => Err(Self::Error::msg(format!("invalid peer role: {value}"))),
        }
    }
}

impl Into<&'static str> for PeerRole {
    fn into(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Callee => "callee",
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }
}

impl Into<String> for PeerRole {
    fn into(self) -> String {
        Into::<&'static str>::into(self).to_owned()
    }
}
