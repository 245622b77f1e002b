//! Turning a [`RunnerConfig`] into engine descriptors.
//!
//! Descriptors borrow their storage, so the table is built in stages, each
//! borrowing the previous one:
//!
//! ```rust,ignore
//! let mut storage = table::allocate(&config);
//! let mut variables = table::bind_variables(&config, &mut storage)?;
//! let mut commands = table::bind_commands(&config, &mut variables);
//! let mut groups = table::bind_groups(&config, &mut commands);
//! let registry = Registry::new(&mut groups);
//! ```

use std::collections::HashMap;

use modem_at::{decode, Command, Group, HandlerResult, Operation, Reply, Variable};
use tracing::info;

use crate::config::{CommandConfig, RunnerConfig};
use crate::error::{Result, RunnerError};

/// Context handed to every handler: per-operation invocation counts.
#[derive(Debug, Default)]
pub struct RunnerContext {
    counts: HashMap<Operation, usize>,
}

impl RunnerContext {
    pub fn count(&self, op: Operation) -> usize {
        self.counts.get(&op).copied().unwrap_or(0)
    }

    fn record(&mut self, op: Operation) {
        *self.counts.entry(op).or_insert(0) += 1;
    }
}

pub type RunnerCommand<'a> = Command<'a, RunnerContext>;

fn log_run(ctx: &mut RunnerContext, cmd: &mut RunnerCommand<'_>, _: &mut Reply<'_>) -> HandlerResult {
    ctx.record(Operation::Run);
    info!(command = cmd.name(), "run");
    Ok(())
}

fn log_read(ctx: &mut RunnerContext, cmd: &mut RunnerCommand<'_>, _: &mut Reply<'_>) -> HandlerResult {
    ctx.record(Operation::Read);
    info!(command = cmd.name(), "read");
    Ok(())
}

fn log_test(ctx: &mut RunnerContext, cmd: &mut RunnerCommand<'_>, _: &mut Reply<'_>) -> HandlerResult {
    ctx.record(Operation::Test);
    info!(command = cmd.name(), "test");
    Ok(())
}

fn log_write(
    ctx: &mut RunnerContext,
    cmd: &mut RunnerCommand<'_>,
    args: &[u8],
    count: usize,
) -> HandlerResult {
    ctx.record(Operation::Write);
    info!(
        command = cmd.name(),
        args = %String::from_utf8_lossy(args),
        count,
        "write"
    );
    Ok(())
}

/// One zeroed buffer per declared variable, in declaration order.
pub fn allocate(config: &RunnerConfig) -> Vec<Vec<u8>> {
    config
        .commands()
        .flat_map(|cmd| cmd.variables.iter())
        .map(|var| vec![0u8; var.size])
        .collect()
}

/// Create the variables of every command, applying initial values.
pub fn bind_variables<'a>(
    config: &'a RunnerConfig,
    storage: &'a mut [Vec<u8>],
) -> Result<Vec<Vec<Variable<'a>>>> {
    let mut slots = storage.iter_mut();
    let mut tables = Vec::new();

    for cmd in config.commands() {
        let mut vars = Vec::with_capacity(cmd.variables.len());
        for decl in &cmd.variables {
            let data = slots.next().ok_or_else(|| {
                RunnerError::Table(format!("no storage for {}.{}", cmd.name, decl.name))
            })?;
            let mut var = Variable::new(&decl.name, decl.kind, data.as_mut_slice())
                .with_access(decl.access);
            var.validate()?;
            if let Some(initial) = &decl.initial {
                decode(&mut var, initial.as_bytes()).map_err(|fault| {
                    RunnerError::Table(format!(
                        "{}.{}: initial value {:?}: {}",
                        cmd.name, decl.name, initial, fault
                    ))
                })?;
            }
            vars.push(var);
        }
        tables.push(vars);
    }

    Ok(tables)
}

fn build_command<'a>(decl: &'a CommandConfig, vars: &'a mut [Variable<'a>]) -> RunnerCommand<'a> {
    let mut cmd = Command::new(&decl.name)
        .with_description(&decl.description)
        .with_variables(vars)
        .need_all_vars(decl.need_all_vars)
        .only_test(decl.only_test)
        .implicit_write(decl.implicit_write)
        .disabled(decl.disabled);
    for op in &decl.handlers {
        cmd = match op {
            Operation::Run => cmd.on_run(log_run),
            Operation::Read => cmd.on_read(log_read),
            Operation::Write => cmd.on_write(log_write),
            Operation::Test => cmd.on_test(log_test),
        };
    }
    cmd
}

/// Create the commands of every group.
pub fn bind_commands<'a>(
    config: &'a RunnerConfig,
    variables: &'a mut [Vec<Variable<'a>>],
) -> Vec<Vec<RunnerCommand<'a>>> {
    let mut tables = variables.iter_mut();
    config
        .groups
        .iter()
        .map(|group| {
            group
                .commands
                .iter()
                .zip(&mut tables)
                .map(|(decl, vars)| build_command(decl, vars.as_mut_slice()))
                .collect()
        })
        .collect()
}

pub fn bind_groups<'a>(
    config: &'a RunnerConfig,
    commands: &'a mut [Vec<RunnerCommand<'a>>],
) -> Vec<Group<'a, RunnerContext>> {
    config
        .groups
        .iter()
        .zip(commands.iter_mut())
        .map(|(decl, cmds)| {
            let mut group = Group::new(&decl.name, cmds.as_mut_slice());
            group.set_disabled(decl.disabled);
            group
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use modem_at::{Engine, MemoryTransport, Registry, Status};

    const TABLE: &str = r#"
groups:
  - name: packet
    commands:
      - name: "+CGATT"
        handlers: [read, write]
        variables:
          - { name: STATE, type: uint_dec, size: 1, initial: "1" }
      - name: "+CGDCONT"
        description: Define PDP context
        handlers: [write]
        need_all_vars: true
        variables:
          - { name: CID, type: uint_dec, size: 1 }
          - { name: APN, type: string, size: 16, initial: '"internet"' }
  - name: hidden
    disabled: true
    commands:
      - name: "+SECRET"
        handlers: [run]
"#;

    #[test]
    fn test_table_drives_engine() {
        let config = RunnerConfig::from_yaml_str(TABLE).unwrap();
        let mut storage = allocate(&config);
        assert_eq!(storage.len(), 3);
        let mut variables = bind_variables(&config, &mut storage).unwrap();
        let mut commands = bind_commands(&config, &mut variables);
        let mut groups = bind_groups(&config, &mut commands);
        let registry = Registry::new(&mut groups);
        assert!(registry.command("+SECRET").is_none());
        assert_eq!(
            registry
                .command("+CGDCONT")
                .and_then(|c| c.variable("APN"))
                .and_then(|v| v.as_str()),
            Some("internet")
        );

        let mut working = [0u8; 128];
        let mut engine = Engine::new(
            MemoryTransport::new(),
            registry,
            &mut working,
            RunnerContext::default(),
        )
        .unwrap();
        engine
            .transport_mut()
            .feed(b"AT+CGATT?\rAT+CGDCONT=2,\"web\"\rAT+SECRET\r");
        for _ in 0..10_000 {
            if engine.step() == Status::Idle {
                break;
            }
        }

        assert_eq!(
            engine.transport().output(),
            b"+CGATT: 1\r\nOK\r\nOK\r\nERROR\r\n"
        );
        assert_eq!(engine.context().count(Operation::Read), 1);
        assert_eq!(engine.context().count(Operation::Write), 1);
        assert_eq!(engine.context().count(Operation::Run), 0);
    }

    #[test]
    fn test_bad_initial_value_is_reported() {
        let yaml = r#"
groups:
  - name: g
    commands:
      - name: "+X"
        variables:
          - { name: N, type: uint_dec, size: 1, initial: "300" }
"#;
        let config = RunnerConfig::from_yaml_str(yaml).unwrap();
        let mut storage = allocate(&config);
        let err = bind_variables(&config, &mut storage).unwrap_err();
        assert!(matches!(err, RunnerError::Table(msg) if msg.contains("+X.N")));
    }

    #[test]
    fn test_bad_width_is_reported() {
        let yaml = r#"
groups:
  - name: g
    commands:
      - name: "+X"
        variables:
          - { name: N, type: hex, size: 3 }
"#;
        let config = RunnerConfig::from_yaml_str(yaml).unwrap();
        let mut storage = allocate(&config);
        assert!(matches!(
            bind_variables(&config, &mut storage),
            Err(RunnerError::Engine(_))
        ));
    }
}
