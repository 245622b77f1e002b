//! Command registry.
//!
//! Groups are searched in declaration order, then commands within a group in
//! declaration order; the first exact, case-sensitive name match wins.
//! Disabled groups and commands are invisible to the search.

use crate::command::{Command, Group};
use crate::error::AtResult;

/// Position of a command inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId {
    group: usize,
    index: usize,
}

impl CommandId {
    pub fn group(&self) -> usize {
        self.group
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// The ordered set of command groups served by an engine.
pub struct Registry<'a, C = ()> {
    groups: &'a mut [Group<'a, C>],
}

impl<'a, C> Registry<'a, C> {
    pub fn new(groups: &'a mut [Group<'a, C>]) -> Self {
        Registry { groups }
    }

    pub fn groups(&self) -> &[Group<'a, C>] {
        &*self.groups
    }

    /// Validate every command of every group.
    pub fn validate(&self) -> AtResult<()> {
        self.groups
            .iter()
            .flat_map(|g| g.commands().iter())
            .try_for_each(|cmd| cmd.validate())
    }

    /// Find the first enabled command named `name`.
    pub fn find(&self, name: &[u8]) -> Option<CommandId> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, group)| !group.is_disabled())
            .find_map(|(g, group)| {
                group
                    .commands()
                    .iter()
                    .position(|cmd| !cmd.is_disabled() && cmd.name().as_bytes() == name)
                    .map(|index| CommandId { group: g, index })
            })
    }

    pub fn get(&self, id: CommandId) -> Option<&Command<'a, C>> {
        self.groups.get(id.group)?.commands().get(id.index)
    }

    pub fn get_mut(&mut self, id: CommandId) -> Option<&mut Command<'a, C>> {
        self.groups
            .get_mut(id.group)?
            .commands_mut()
            .get_mut(id.index)
    }

    /// The first enabled command named `name`.
    pub fn command(&self, name: &str) -> Option<&Command<'a, C>> {
        let id = self.find(name.as_bytes())?;
        self.get(id)
    }

    /// The first command named `name`, disabled or not, so that it can be
    /// re-enabled.
    pub fn command_mut(&mut self, name: &str) -> Option<&mut Command<'a, C>> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.commands_mut().iter_mut())
            .find(|cmd| cmd.name() == name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group<'a, C>> {
        self.groups.iter_mut().find(|g| g.name() == name)
    }

    /// Enabled commands in search order.
    pub fn enabled(&self) -> impl Iterator<Item = &Command<'a, C>> + '_ {
        self.groups
            .iter()
            .filter(|g| !g.is_disabled())
            .flat_map(|g| g.commands().iter())
            .filter(|cmd| !cmd.is_disabled())
    }
}

impl<C> std::fmt::Debug for Registry<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("groups", &self.groups)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_in_declaration_order() {
        let mut first = [Command::new("+CSQ"), Command::new("+CGATT")];
        let mut second = [Command::new("+CGATT").with_description("shadowed")];
        let mut groups = [
            Group::new("first", &mut first),
            Group::new("second", &mut second),
        ];
        let registry: Registry<'_> = Registry::new(&mut groups);

        let id = registry.find(b"+CGATT").unwrap();
        assert_eq!((id.group(), id.index()), (0, 1));
        assert!(registry.find(b"+cgatt").is_none());
        assert!(registry.find(b"+CGAT").is_none());
    }

    #[test]
    fn test_disabled_commands_are_invisible() {
        let mut first = [Command::new("+CGATT").disabled(true)];
        let mut second = [Command::new("+CGATT").with_description("fallback")];
        let mut groups = [
            Group::new("first", &mut first),
            Group::new("second", &mut second),
        ];
        let mut registry: Registry<'_> = Registry::new(&mut groups);

        assert_eq!(
            registry.command("+CGATT").map(|c| c.description()),
            Some("fallback")
        );

        registry.group_mut("second").unwrap().set_disabled(true);
        assert!(registry.find(b"+CGATT").is_none());
        assert_eq!(registry.enabled().count(), 0);

        registry.command_mut("+CGATT").unwrap().set_disabled(false);
        assert_eq!(registry.find(b"+CGATT").map(|id| id.group()), Some(0));
    }

    #[test]
    fn test_validate_reports_bad_names() {
        let mut cmds = [Command::new("+OK"), Command::new("BAD NAME")];
        let mut groups = [Group::new("g", &mut cmds)];
        let registry: Registry<'_> = Registry::new(&mut groups);
        assert!(registry.validate().is_err());
    }
}
