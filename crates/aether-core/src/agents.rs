use serde::{Deserialize, Serialize};

/// The six fixed agent roles. The set is closed: orchestration, prompt
/// scoping, and the providers all assume exactly these members.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    Coordinator,
    Researcher,
    Skeptic,
    Coder,
    Writer,
    Summarizer,
}

impl AgentId {
    /// All roles in the order a default run enables them.
    pub const ALL: [AgentId; 6] = [
        AgentId::Coordinator,
        AgentId::Researcher,
        AgentId::Skeptic,
        AgentId::Coder,
        AgentId::Writer,
        AgentId::Summarizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Researcher => "researcher",
            Self::Skeptic => "skeptic",
            Self::Coder => "coder",
            Self::Writer => "writer",
            Self::Summarizer => "summarizer",
        }
    }

    /// Capitalized name used when tagging transcript lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Coordinator => "Coordinator",
            Self::Researcher => "Researcher",
            Self::Skeptic => "Skeptic",
            Self::Coder => "Coder",
            Self::Writer => "Writer",
            Self::Summarizer => "Summarizer",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coordinator" => Ok(Self::Coordinator),
            "researcher" => Ok(Self::Researcher),
            "skeptic" => Ok(Self::Skeptic),
            "coder" => Ok(Self::Coder),
            "writer" => Ok(Self::Writer),
            "summarizer" => Ok(Self::Summarizer),
            other => Err(format!("unknown agent: {other}")),
        }
    }
}
