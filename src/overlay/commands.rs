use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fmt;

/// User intent pushed back out of the overlay to a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayCommand {
    Stop { event_id: String },
    Snooze { event_id: String, minutes: u32 },
    DeleteAlarm { event_id: String },
    PauseAlarm { event_id: String },
    ResumeAlarm { event_id: String },
    CompleteReminder { event_id: String },
    DelayReminder { event_id: String, seconds: u64 },
    DeleteReminder { event_id: String },
    ToggleEarmuffs,
    TriggerUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Stop,
    Snooze,
    DeleteAlarm,
    PauseAlarm,
    ResumeAlarm,
    CompleteReminder,
    DelayReminder,
    DeleteReminder,
    ToggleEarmuffs,
    TriggerUpdate,
}

impl CommandKind {
    /// Name of the collaborator callback that handles this command.
    pub fn callback_name(self) -> &'static str {
        match self {
            CommandKind::Stop => "on_stop_request",
            CommandKind::Snooze => "on_snooze_request",
            CommandKind::DeleteAlarm => "on_delete_alarm",
            CommandKind::PauseAlarm => "on_pause_alarm",
            CommandKind::ResumeAlarm => "on_resume_alarm",
            CommandKind::CompleteReminder => "on_complete_reminder",
            CommandKind::DelayReminder => "on_delay_reminder",
            CommandKind::DeleteReminder => "on_delete_reminder",
            CommandKind::ToggleEarmuffs => "on_toggle_earmuffs",
            CommandKind::TriggerUpdate => "on_trigger_update",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.callback_name())
    }
}

impl OverlayCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            OverlayCommand::Stop { .. } => CommandKind::Stop,
            OverlayCommand::Snooze { .. } => CommandKind::Snooze,
            OverlayCommand::DeleteAlarm { .. } => CommandKind::DeleteAlarm,
            OverlayCommand::PauseAlarm { .. } => CommandKind::PauseAlarm,
            OverlayCommand::ResumeAlarm { .. } => CommandKind::ResumeAlarm,
            OverlayCommand::CompleteReminder { .. } => CommandKind::CompleteReminder,
            OverlayCommand::DelayReminder { .. } => CommandKind::DelayReminder,
            OverlayCommand::DeleteReminder { .. } => CommandKind::DeleteReminder,
            OverlayCommand::ToggleEarmuffs => CommandKind::ToggleEarmuffs,
            OverlayCommand::TriggerUpdate => CommandKind::TriggerUpdate,
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            OverlayCommand::Stop { event_id }
            | OverlayCommand::Snooze { event_id, .. }
            | OverlayCommand::DeleteAlarm { event_id }
            | OverlayCommand::PauseAlarm { event_id }
            | OverlayCommand::ResumeAlarm { event_id }
            | OverlayCommand::CompleteReminder { event_id }
            | OverlayCommand::DelayReminder { event_id, .. }
            | OverlayCommand::DeleteReminder { event_id } => Some(event_id),
            OverlayCommand::ToggleEarmuffs | OverlayCommand::TriggerUpdate => None,
        }
    }
}

#[derive(Debug)]
pub enum DispatchError {
    Unavailable(CommandKind),
    Failed(anyhow::Error),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Unavailable(kind) => write!(f, "{kind} is not configured"),
            DispatchError::Failed(err) => write!(f, "command handler failed: {err:#}"),
        }
    }
}

impl std::error::Error for DispatchError {}

pub type CommandHandler = Box<dyn Fn(&OverlayCommand) -> Result<()> + Send + Sync>;

/// Registry of collaborator handlers, one optional handler per command kind.
///
/// Handlers run on the server's blocking pool, possibly concurrently;
/// they must do their own synchronisation.
#[derive(Default)]
pub struct OverlayCallbacks {
    handlers: HashMap<CommandKind, CommandHandler>,
}

impl OverlayCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, kind: CommandKind, handler: F) -> Self
    where
        F: Fn(&OverlayCommand) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    pub fn supports(&self, kind: CommandKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn dispatch(&self, command: &OverlayCommand) -> Result<(), DispatchError> {
        let kind = command.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(DispatchError::Unavailable(kind))?;
        handler(command).map_err(DispatchError::Failed)
    }

    pub fn on_stop_request<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.register_entity(CommandKind::Stop, f)
    }

    pub fn on_snooze_request<F>(self, f: F) -> Self
    where
        F: Fn(&str, u32) -> Result<()> + Send + Sync + 'static,
    {
        self.register(CommandKind::Snooze, move |cmd| match cmd {
            OverlayCommand::Snooze { event_id, minutes } => f(event_id, *minutes),
            other => Err(mismatch(CommandKind::Snooze, other)),
        })
    }

    pub fn on_delete_alarm<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.register_entity(CommandKind::DeleteAlarm, f)
    }

    pub fn on_pause_alarm<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.register_entity(CommandKind::PauseAlarm, f)
    }

    pub fn on_resume_alarm<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.register_entity(CommandKind::ResumeAlarm, f)
    }

    pub fn on_complete_reminder<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.register_entity(CommandKind::CompleteReminder, f)
    }

    pub fn on_delay_reminder<F>(self, f: F) -> Self
    where
        F: Fn(&str, u64) -> Result<()> + Send + Sync + 'static,
    {
        self.register(CommandKind::DelayReminder, move |cmd| match cmd {
            OverlayCommand::DelayReminder { event_id, seconds } => f(event_id, *seconds),
            other => Err(mismatch(CommandKind::DelayReminder, other)),
        })
    }

    pub fn on_delete_reminder<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.register_entity(CommandKind::DeleteReminder, f)
    }

    pub fn on_toggle_earmuffs<F>(self, f: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.register(CommandKind::ToggleEarmuffs, move |_| f())
    }

    pub fn on_trigger_update<F>(self, f: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.register(CommandKind::TriggerUpdate, move |_| f())
    }

    fn register_entity<F>(self, kind: CommandKind, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.register(kind, move |cmd| match cmd.event_id() {
            Some(event_id) if cmd.kind() == kind => f(event_id),
            _ => Err(mismatch(kind, cmd)),
        })
    }
}

fn mismatch(expected: CommandKind, got: &OverlayCommand) -> anyhow::Error {
    anyhow!("{expected} received a {} command", got.kind())
}
