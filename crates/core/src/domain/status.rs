// Import Job Status

/// Observed state of a remote import job
///
/// `Complete` and `Failed` are terminal. `Pending` and `Unknown` are re-polled
/// while the attempt deadline allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    Pending,
    Complete,
    Failed(String),
    /// Unrecognized remote state, or a status query that could not be answered
    Unknown(String),
}

impl ImportStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            ImportStatus::Complete | ImportStatus::Failed(_) => true,
            ImportStatus::Pending | ImportStatus::Unknown(_) => false,
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportStatus::Pending => write!(f, "PENDING"),
            ImportStatus::Complete => write!(f, "COMPLETE"),
            ImportStatus::Failed(reason) => write!(f, "FAILED ({})", reason),
            ImportStatus::Unknown(raw) => write!(f, "UNKNOWN ({})", raw),
        }
    }
}
