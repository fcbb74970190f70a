use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Back-office area an alert links to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertModule {
    Shifts,
    Finance,
    Boarding,
}

impl AlertModule {
    pub const fn link(&self) -> &'static str {
        match self {
            AlertModule::Shifts => "/agence/sessions",
            AlertModule::Finance => "/agence/finances",
            AlertModule::Boarding => "/agence/embarquement",
        }
    }
}

/// One derived alert. Never persisted; recomputed from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerAlert {
    /// Stable per rule, so a UI can key and dismiss it across recomputes.
    pub id: &'static str,
    pub severity: Severity,
    pub module: AlertModule,
    pub title: String,
    pub description: String,
    pub link: String,
}

impl ManagerAlert {
    pub(crate) fn new(
        id: &'static str,
        severity: Severity,
        module: AlertModule,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            severity,
            module,
            title: title.into(),
            description: description.into(),
            link: module.link().to_string(),
        }
    }
}
