//! Persisting stage outputs to fixed-name text files.

use std::path::{Path, PathBuf};

use tracing::info;

use riskflow_shared::{Result, RiskflowError};

/// Which output a piece of text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Summary,
    Features,
    Risks,
}

impl OutputKind {
    /// Fixed file name the output is saved under.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Summary => "modified_summary_report.txt",
            Self::Features => "feature_details_report.txt",
            Self::Risks => "risk_analysis_report.txt",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::Features => "Feature details",
            Self::Risks => "Risk analysis",
        }
    }
}

impl std::str::FromStr for OutputKind {
    type Err = RiskflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "features" => Ok(Self::Features),
            "risks" => Ok(Self::Risks),
            other => Err(RiskflowError::validation(format!(
                "unknown output '{other}': expected summary, features, or risks"
            ))),
        }
    }
}

/// Write `text` plus one trailing newline to the file for `kind` in `dir`,
/// replacing any previous content. Returns the written path.
pub fn save_output(dir: &Path, kind: OutputKind, text: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| RiskflowError::io(dir, e))?;

    let path = dir.join(kind.file_name());
    std::fs::write(&path, format!("{text}\n")).map_err(|e| RiskflowError::io(&path, e))?;

    info!(?path, kind = kind.label(), bytes = text.len() + 1, "output saved");
    Ok(path)
}

/// Confirmation shown after a successful save.
pub fn save_confirmation(kind: OutputKind) -> String {
    match kind {
        OutputKind::Summary => "Edited summary saved successfully!".to_string(),
        other => format!("{} saved successfully!", other.label()),
    }
}
