use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One model-backed step of the intent-to-deployment chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Ihf,
    PolicyCreator,
    Selector,
    Configurator,
    Executor,
    Monitor,
}

impl StageKind {
    /// Stages run by the orchestration loop, in call order. The monitor is
    /// only driven by the separate evaluation entry point.
    pub const UPSTREAM: [StageKind; 5] = [
        StageKind::Ihf,
        StageKind::PolicyCreator,
        StageKind::Selector,
        StageKind::Configurator,
        StageKind::Executor,
    ];

    pub const ALL: [StageKind; 6] = [
        StageKind::Ihf,
        StageKind::PolicyCreator,
        StageKind::Selector,
        StageKind::Configurator,
        StageKind::Executor,
        StageKind::Monitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ihf => "ihf",
            Self::PolicyCreator => "policy_creator",
            Self::Selector => "selector",
            Self::Configurator => "configurator",
            Self::Executor => "executor",
            Self::Monitor => "monitor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ihf => "IHF",
            Self::PolicyCreator => "Policy Creator",
            Self::Selector => "Selector",
            Self::Configurator => "Configurator",
            Self::Executor => "Executor",
            Self::Monitor => "Monitor",
        }
    }

    pub fn output_title(&self) -> String {
        format!("{} OUTPUT", self.display_name().to_ascii_uppercase())
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown stage `{value}`"))
    }
}
