//! Forecast variable identifiers.

use serde::{Deserialize, Serialize};

/// Whether a variable is reported on a model layer or at a fixed height/surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForecastKind {
    ModelLevel,
    SingleLevel,
}

impl ForecastKind {
    /// Token used in archive filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastKind::ModelLevel => "model-level",
            ForecastKind::SingleLevel => "single-level",
        }
    }
}

/// A (variable, level) pair; `level` is `None` for single-level variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableKey {
    pub variable: String,
    pub level: Option<String>,
}

impl VariableKey {
    pub fn new(variable: impl Into<String>, level: Option<String>) -> Self {
        Self {
            variable: variable.into(),
            level,
        }
    }

    pub fn single_level(variable: impl Into<String>) -> Self {
        Self::new(variable, None)
    }

    pub fn model_level(variable: impl Into<String>, level: impl Into<String>) -> Self {
        Self::new(variable, Some(level.into()))
    }

    pub fn kind(&self) -> ForecastKind {
        if self.level.is_some() {
            ForecastKind::ModelLevel
        } else {
            ForecastKind::SingleLevel
        }
    }

    /// Output column name: `{variable}_level{level}` or the bare variable.
    pub fn column_name(&self) -> String {
        match &self.level {
            Some(level) => format!("{}_level{}", self.variable, level),
            None => self.variable.clone(),
        }
    }
}

impl std::fmt::Display for VariableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.column_name())
    }
}
