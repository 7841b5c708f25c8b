/// How an in-flight procedure call should be canceled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CallCancelMode {
    /// The router replies to the caller immediately. The callee is not interrupted.
    #[default]
    Skip,
    /// The callee is interrupted, and its eventual reply is forwarded to the caller.
    Kill,
    /// The callee is interrupted, and its eventual reply is discarded.
    KillNoWait,
}

impl TryFrom<&str> for CallCancelMode {
    type Error = anyhow::Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "skip" => Ok(Self::Skip),
            "kill" => Ok(Self::Kill),
            "killnowait" => Ok(Self::KillNoWait),
            _ => Err(Self::Error::msg(format!(
                "invalid call cancel mode: {value}"
            ))),
        }
    }
}

impl Into<&'static str> for CallCancelMode {
    fn into(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Kill => "kill",
            Self::KillNoWait => "killnowait",
        }
    }
}

impl Into<String> for CallCancelMode {
    fn into(self) -> String {
        Into::<&'static str>::into(self).to_owned()
    }
}
