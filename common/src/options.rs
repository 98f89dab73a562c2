use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Sparse,
    #[default]
    Normal,
    Dense,
}

impl std::fmt::Display for Density {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Density::Sparse => "sparse",
            Density::Normal => "normal",
            Density::Dense => "dense",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Density {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_density(s)
    }
}

pub fn parse_density(s: &str) -> Result<Density> {
    match s.trim().to_lowercase().as_str() {
        "sparse" | "light" => Ok(Density::Sparse),
        "normal" | "" => Ok(Density::Normal),
        "dense" | "detailed" => Ok(Density::Dense),
        _ => Err(anyhow!("Invalid density: {}. Use sparse, normal or dense", s)),
    }
}

/// Generation settings sent along with the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub template_id: String,
    pub language: String,
    pub density: Density,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            template_id: crate::DEFAULT_TEMPLATE_ID.to_string(),
            language: crate::DEFAULT_LANGUAGE.to_string(),
            density: Density::Normal,
        }
    }
}

impl GenerateOptions {
    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = template_id.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_density(mut self, density: Density) -> Self {
        self.density = density;
        self
    }
}
