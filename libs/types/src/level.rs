use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordinal severity of a log event
///
/// The numeric values are part of the wire contract: a [`crate::LogMessage`]
/// carries the level as its integer ordinal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(i32)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Verbose = 0,
    Debug = 1,
    #[default]
    Information = 2,
    Warning = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Verbose,
        Level::Debug,
        Level::Information,
        Level::Warning,
        Level::Error,
        Level::Fatal,
    ];

    /// Full display name, e.g. `Information`
    pub fn name(self) -> &'static str {
        match self {
            Level::Verbose => "Verbose",
            Level::Debug => "Debug",
            Level::Information => "Information",
            Level::Warning => "Warning",
            Level::Error => "Error",
            Level::Fatal => "Fatal",
        }
    }

    /// Three letter upper-case abbreviation, e.g. `INF`
    pub fn short_name(self) -> &'static str {
        match self {
            Level::Verbose => "VRB",
            Level::Debug => "DBG",
            Level::Information => "INF",
            Level::Warning => "WRN",
            Level::Error => "ERR",
            Level::Fatal => "FTL",
        }
    }

    /// Integer ordinal used on the wire
    pub fn ordinal(self) -> i32 {
        self.into()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let level = match lowered.as_str() {
            "verbose" | "trace" | "vrb" => Level::Verbose,
            "debug" | "dbg" => Level::Debug,
            "information" | "info" | "inf" => Level::Information,
            "warning" | "warn" | "wrn" => Level::Warning,
            "error" | "err" => Level::Error,
            "fatal" | "critical" | "ftl" => Level::Fatal,
            other => return Err(format!("Unknown log level '{}'", other)),
        };
        Ok(level)
    }
}
