//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Terminator appended to every line the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    #[default]
    #[serde(rename = "crlf", alias = "cr_lf")]
    CrLf,
    Cr,
    Lf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::CrLf => b"\r\n",
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
        }
    }
}

/// Tunables for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub line_ending: LineEnding,
    /// Answer `AT#HELP` with a listing of the enabled commands.
    pub help_command: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            line_ending: LineEnding::CrLf,
            help_command: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.line_ending.as_bytes(), b"\r\n");
        assert!(config.help_command);
    }

    #[test]
    fn test_yaml_partial_override() {
        let config: EngineConfig = serde_yaml::from_str("line_ending: lf\n").unwrap();
        assert_eq!(config.line_ending, LineEnding::Lf);
        assert!(config.help_command);

        let config: EngineConfig = serde_yaml::from_str("help_command: false\n").unwrap();
        assert_eq!(config.line_ending, LineEnding::CrLf);
        assert!(!config.help_command);
    }

    #[test]
    fn test_yaml_line_ending_names() {
        for (name, expected) in [
            ("crlf", LineEnding::CrLf),
            ("cr", LineEnding::Cr),
            ("lf", LineEnding::Lf),
        ] {
            let yaml = format!("line_ending: {}\n", name);
            let config: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
            assert_eq!(config.line_ending, expected);
        }
        assert_eq!(serde_yaml::to_string(&LineEnding::CrLf).unwrap().trim(), "crlf");
    }
}
