//! The read-eval loop of the monitor.
//!
//! A [`Monitor`] owns a [`CommandTable`]. [`Monitor::run`] greets the
//! operator, then repeatedly prompts, reads a line and hands it to
//! [`Monitor::run_cmd`], which splits it into words and invokes the command
//! named by the first one.
//!
//! Commands return an integer status: `0` keeps the loop going and a negative
//! value leaves the monitor.
use crate::{
    Env,
    commands::{Backtrace, Dump, Exit, Help, KernInfo, SetPerm, ShowMappings},
    teletype::{CMDBUF_SIZE, Teletype, readline},
    MonitorError,
};
use abyss::interrupt::Registers;
use alloc::{boxed::Box, vec::Vec};
use arrayvec::ArrayVec;
use core::fmt::Write;

/// Maximum number of words in a command line, counting the command name and
/// one slot of slack.
pub const MAXARGS: usize = 16;

/// The prompt printed before each command line.
pub const PROMPT: &str = "K> ";

/// Characters that separate the words of a command line.
pub const WHITESPACE: [char; 4] = ['\t', '\r', '\n', ' '];

/// What a command gets to work with.
pub struct Context<'c, 'e> {
    /// Every registered command, for `help`.
    pub commands: &'c CommandTable,
    /// The capabilities of the machine.
    pub env: &'c mut Env<'e>,
    /// Where output goes.
    pub out: &'c mut dyn Write,
}

/// A monitor command.
pub trait Command {
    /// Word that invokes the command.
    fn name(&self) -> &'static str;

    /// One-line description shown by `help`.
    fn description(&self) -> &'static str;

    /// Runs the command. `args[0]` is the command name.
    ///
    /// Returns `0` to keep the monitor running, or a negative value to leave
    /// it.
    fn invoke(&self, args: &[&str], cx: &mut Context<'_, '_>) -> isize;
}

/// Commands by name, in registration order.
#[derive(Default)]
pub struct CommandTable {
    commands: Vec<Box<dyn Command>>,
}

impl CommandTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in commands: `help`, `kerninfo`, `backtrace`,
    /// `showmappings`, `setperm`, `dump` and `exit`.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(Help);
        table.register(KernInfo);
        table.register(Backtrace);
        table.register(ShowMappings);
        table.register(SetPerm);
        table.register(Dump);
        table.register(Exit);
        table
    }

    /// Adds `command`, replacing any command of the same name in place.
    pub fn register(&mut self, command: impl Command + 'static) {
        match self.commands.iter_mut().find(|c| c.name() == command.name()) {
            Some(slot) => *slot = Box::new(command),
            None => self.commands.push(Box::new(command)),
        }
    }

    /// The command called `name`.
    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Every command, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.iter().map(|c| c.as_ref())
    }
}

/// Splits `line` into words. `None` if there are more than `MAXARGS - 1`.
fn parse_args(line: &str) -> Option<ArrayVec<&str, MAXARGS>> {
    let mut argv = ArrayVec::new();
    for word in line.split(WHITESPACE).filter(|w| !w.is_empty()) {
        if argv.len() == MAXARGS - 1 {
            return None;
        }
        argv.push(word);
    }
    Some(argv)
}

/// The kernel monitor.
pub struct Monitor {
    commands: CommandTable,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    /// A monitor with the built-in commands.
    pub fn new() -> Self {
        Self::with_commands(CommandTable::with_defaults())
    }

    /// A monitor with the given commands.
    pub fn with_commands(commands: CommandTable) -> Self {
        Self { commands }
    }

    /// The registered commands.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Runs one command line and returns its status.
    ///
    /// An empty line does nothing. A line with too many words or an unknown
    /// command name is reported and returns `0`.
    pub fn run_cmd(&self, line: &str, env: &mut Env<'_>, out: &mut dyn Write) -> isize {
        let Some(argv) = parse_args(line) else {
            let _ = writeln!(out, "Too many arguments (max {MAXARGS})");
            return 0;
        };
        let Some(name) = argv.first() else {
            return 0;
        };
        match self.commands.get(name) {
            Some(command) => command.invoke(
                &argv,
                &mut Context {
                    commands: &self.commands,
                    env,
                    out,
                },
            ),
            None => {
                let _ = writeln!(out, "Unknown command '{name}'");
                0
            }
        }
    }

    /// Greets the operator and serves commands from `tty` until one returns a
    /// negative status or the input ends.
    ///
    /// When the monitor was entered from a trap, `tf` is printed first.
    pub fn run<T: Teletype>(
        &self,
        tty: &mut T,
        env: &mut Env<'_>,
        tf: Option<&Registers>,
    ) -> Result<(), MonitorError> {
        writeln!(tty, "Welcome to the kernel monitor!")?;
        writeln!(tty, "Type 'help' for a list of commands.")?;
        if let Some(tf) = tf {
            writeln!(tty, "{tf:?}")?;
        }

        let mut buf = [0u8; CMDBUF_SIZE];
        loop {
            let Some(line) = readline(tty, PROMPT, &mut buf)? else {
                info!("kmon: end of input");
                return Ok(());
            };
            if self.run_cmd(line, env, tty) < 0 {
                info!("kmon: leaving the monitor");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        let argv = parse_args("  setperm\t0x1000 2\r\nW ").unwrap();
        assert_eq!(argv.as_slice(), ["setperm", "0x1000", "2", "W"]);
        assert!(parse_args(" \t ").unwrap().is_empty());
    }

    #[test]
    fn argument_limit() {
        assert_eq!(parse_args("a b c d e f g h i j k l m n o").unwrap().len(), 15);
        assert!(parse_args("a b c d e f g h i j k l m n o p").is_none());
    }

    #[test]
    fn default_order() {
        let names: Vec<_> = CommandTable::with_defaults().iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            ["help", "kerninfo", "backtrace", "showmappings", "setperm", "dump", "exit"]
        );
    }

    #[test]
    fn register_replaces() {
        struct Quit;
        impl Command for Quit {
            fn name(&self) -> &'static str {
                "exit"
            }
            fn description(&self) -> &'static str {
                "Quit"
            }
            fn invoke(&self, _args: &[&str], _cx: &mut Context<'_, '_>) -> isize {
                -2
            }
        }
        let mut table = CommandTable::with_defaults();
        table.register(Quit);
        assert_eq!(table.iter().count(), 7);
        assert_eq!(table.get("exit").map(|c| c.description()), Some("Quit"));
    }
}
