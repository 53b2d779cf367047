//! First-run setup wizard.
//!
//! The wizard walks through:
//! 1. Welcome
//! 2. LLM provider and credentials (validated against the backend)
//! 3. Admin and personal accounts
//! 4. Agent template
//! 5. Adapters, then a single completion request

mod adapters;
pub mod catalog;
mod draft;
mod wizard;

use std::fmt;

use serde::Serialize;

pub use self::adapters::{ADAPTER_CATALOG, API_ADAPTER_ID, AdapterField, AdapterKind, AdapterSpec};
pub use self::draft::{BackupLlmDraft, LlmDraft, UsersDraft, WizardDraft};
pub use self::wizard::{LoginHandoff, Notice, NoticeLevel, SetupWizard, WizardView};

/// Wizard step, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Welcome,
    Llm,
    Users,
    Template,
    Adapters,
    Complete,
}

impl WizardStep {
    pub const ALL: [WizardStep; 6] = [
        Self::Welcome,
        Self::Llm,
        Self::Users,
        Self::Template,
        Self::Adapters,
        Self::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Llm => "llm",
            Self::Users => "users",
            Self::Template => "template",
            Self::Adapters => "adapters",
            Self::Complete => "complete",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Welcome => "Welcome",
            Self::Llm => "LLM Provider",
            Self::Users => "Accounts",
            Self::Template => "Agent Template",
            Self::Adapters => "Adapters",
            Self::Complete => "Complete",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress marker for one step in the step indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Current,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardProgress {
    pub steps: Vec<(WizardStep, StepStatus)>,
}

impl WizardProgress {
    pub fn at(current: WizardStep) -> Self {
        let steps = WizardStep::ALL
            .iter()
            .map(|&step| {
                let status = match step.cmp(&current) {
                    std::cmp::Ordering::Less => StepStatus::Done,
                    std::cmp::Ordering::Equal => StepStatus::Current,
                    std::cmp::Ordering::Greater => StepStatus::Pending,
                };
                (step, status)
            })
            .collect();
        Self { steps }
    }
}
