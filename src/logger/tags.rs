/// Log tags identify the subsystem a message comes from
///
/// Each tag has a fixed console label and a debug key used by the
/// `--debug-<key>` command-line flags.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Subscriptions,
    Transport,
    Compose,
    Sink,
    Bridge,
    Test,
}

impl LogTag {
    /// Every tag, in display order
    pub const ALL: [LogTag; 8] = [
        LogTag::System,
        LogTag::Config,
        LogTag::Subscriptions,
        LogTag::Transport,
        LogTag::Compose,
        LogTag::Sink,
        LogTag::Bridge,
        LogTag::Test,
    ];

    /// Console label without colors
    pub fn to_plain_string(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Subscriptions => "SUBS",
            LogTag::Transport => "GQL",
            LogTag::Compose => "COMPOSE",
            LogTag::Sink => "SINK",
            LogTag::Bridge => "BRIDGE",
            LogTag::Test => "TEST",
        }
    }

    /// Key used by `--debug-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Subscriptions => "subscriptions",
            LogTag::Transport => "transport",
            LogTag::Compose => "compose",
            LogTag::Sink => "sink",
            LogTag::Bridge => "bridge",
            LogTag::Test => "test",
        }
        .to_string()
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
