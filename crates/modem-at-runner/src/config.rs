//! YAML description of a command table.
//!
//! ```yaml
//! engine:
//!   line_ending: crlf
//! working_buffer: 256
//! unsolicited_buffer: 128
//! groups:
//!   - name: packet
//!     commands:
//!       - name: "+CGATT"
//!         description: Packet domain attach
//!         handlers: [read, write]
//!         variables:
//!           - { name: STATE, type: uint_dec, size: 1, initial: "0" }
//! requests:
//!   - { command: "+CSQ", op: run }
//! ```

use std::path::Path;

use modem_at::{Access, EngineConfig, Operation, VarType};
use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_working_buffer() -> usize {
    256
}

fn default_unsolicited_buffer() -> usize {
    128
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default = "default_working_buffer")]
    pub working_buffer: usize,
    /// Zero disables unsolicited output and requests.
    #[serde(default = "default_unsolicited_buffer")]
    pub unsolicited_buffer: usize,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    /// Requests sent to the peer at startup, one after the other.
    #[serde(default)]
    pub requests: Vec<RequestConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
    /// Operations answered by a logging handler.
    #[serde(default)]
    pub handlers: Vec<Operation>,
    #[serde(default)]
    pub need_all_vars: bool,
    #[serde(default)]
    pub only_test: bool,
    #[serde(default)]
    pub implicit_write: bool,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VarType,
    pub size: usize,
    #[serde(default)]
    pub access: Access,
    /// Initial value in wire form, e.g. `"42"` or `"\"internet\""`.
    #[serde(default)]
    pub initial: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub command: String,
    pub op: Operation,
    #[serde(default)]
    pub args: String,
}

impl RunnerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Iterate every command in declaration order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandConfig> {
        self.groups.iter().flat_map(|g| g.commands.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modem_at::LineEnding;

    const TABLE: &str = r#"
engine:
  line_ending: lf
working_buffer: 64
groups:
  - name: packet
    commands:
      - name: "+CGDCONT"
        description: Define PDP context
        handlers: [write, test]
        need_all_vars: true
        variables:
          - { name: CID, type: uint_dec, size: 1 }
          - { name: APN, type: string, size: 32, access: write_only, initial: '"internet"' }
  - name: sim
    disabled: true
    commands:
      - name: "+CCID"
requests:
  - { command: "+CSQ", op: run }
"#;

    #[test]
    fn test_parse_table() {
        let config = RunnerConfig::from_yaml_str(TABLE).unwrap();
        assert_eq!(config.engine.line_ending, LineEnding::Lf);
        assert!(config.engine.help_command);
        assert_eq!(config.working_buffer, 64);
        assert_eq!(config.unsolicited_buffer, 128);
        assert_eq!(config.groups.len(), 2);
        assert!(config.groups[1].disabled);

        let cmd = &config.groups[0].commands[0];
        assert_eq!(cmd.handlers, vec![Operation::Write, Operation::Test]);
        assert!(cmd.need_all_vars);
        assert_eq!(cmd.variables[1].kind, VarType::String);
        assert_eq!(cmd.variables[1].access, Access::WriteOnly);
        assert_eq!(cmd.variables[1].initial.as_deref(), Some("\"internet\""));
        assert_eq!(cmd.variables[0].access, Access::ReadWrite);

        assert_eq!(config.commands().count(), 2);
        assert_eq!(config.requests[0].op, Operation::Run);
        assert!(config.requests[0].args.is_empty());
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let yaml = r#"
groups:
  - name: g
    commands:
      - name: "+X"
        variables:
          - { name: A, type: float, size: 4 }
"#;
        assert!(RunnerConfig::from_yaml_str(yaml).is_err());
    }
}
