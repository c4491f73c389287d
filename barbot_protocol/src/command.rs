//! Command descriptors for the registry.

/// The three command kinds of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Synchronous configuration mutation; acknowledged immediately.
    Set,
    /// Synchronous value query; the acknowledgement carries the value.
    Get,
    /// Asynchronous multi-tick operation; tracked until done or failed.
    Do,
}

/// What a running `Do` command reports when polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Running,
    Done,
    Failed { code: u8, value: i64 },
}

/// Start callback: `None` rejects the command (NAK, no state change);
/// `Some(value)` accepts it, with the value reported for `Get` commands.
pub type StartFn = Box<dyn FnMut(&[&str]) -> Option<i64>>;

/// Poll callback for `Do` commands, invoked once per dispatcher tick.
pub type PollFn = Box<dyn FnMut() -> CommandState>;

pub(crate) struct Command {
    pub(crate) name: &'static str,
    pub(crate) kind: CommandKind,
    pub(crate) start: StartFn,
    pub(crate) poll: Option<PollFn>,
}
