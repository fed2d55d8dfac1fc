//! Routes chat commands and free-text replies to the intake dialogue and the
//! job registry, and writes the replies.

use std::sync::{Arc, Mutex, MutexGuard};

use shared::dialog::{DialogController, DialogStep, Stage};
use shared::models::{ChatId, MAX_PEOPLE, MIN_PEOPLE};
use tracing::{debug, info, warn};

use crate::keep_alive::KeepAlive;
use crate::notifier::{Notifier, OutboundMessage, ReplyMarkup};
use crate::registry::JobRegistry;
use crate::telegram::InboundEvent;

pub const HELP_TEXT: &str = "/add - Add a new job to watch for an appointment.\n\
/cancel - Cancel the current dialogue.\n\
/list - List all current jobs.\n\
/clear - Remove all current jobs from the queue.\n\
/help - Display help message.";

const INTRO_TEXT: &str = "This bot allows user to set up one or several jobs that will \
periodically check for appointments of a specified type at a specified location of IND \
(migration authority of the Netherlands).";

pub struct CommandRouter {
    dialog: Mutex<DialogController>,
    registry: JobRegistry,
    keep_alive: Option<KeepAlive>,
    notifier: Arc<dyn Notifier>,
}

impl CommandRouter {
    pub fn new(
        dialog: DialogController,
        registry: JobRegistry,
        keep_alive: Option<KeepAlive>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            dialog: Mutex::new(dialog),
            registry,
            keep_alive,
            notifier,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub async fn handle(&self, event: InboundEvent) {
        let chat_id = event.chat_id();
        let reply = match event {
            InboundEvent::Command { command, .. } => self.on_command(chat_id, &command),
            InboundEvent::Message { text, .. } => self.on_text(chat_id, &text),
        };

        if let Some(reply) = reply {
            if let Err(err) = self.notifier.send(reply).await {
                warn!(chat_id, error = %err, "failed to send reply");
            }
        }
    }

    fn on_command(&self, chat_id: ChatId, command: &str) -> Option<OutboundMessage> {
        match command {
            "start" => Some(OutboundMessage::text(
                chat_id,
                format!("{INTRO_TEXT}\n\n{HELP_TEXT}"),
            )),
            "help" => Some(OutboundMessage::text(chat_id, HELP_TEXT)),
            "add" => {
                let stage = self.lock_dialog().start(chat_id);
                debug!(chat_id, "intake dialogue started");
                Some(self.prompt(chat_id, stage))
            }
            "cancel" => {
                if !self.lock_dialog().cancel(chat_id) {
                    return None;
                }
                info!(chat_id, "intake dialogue cancelled");
                Some(
                    OutboundMessage::text(chat_id, "Scheduling cancelled.")
                        .with_markup(ReplyMarkup::RemoveKeyboard),
                )
            }
            "list" => Some(OutboundMessage::text(chat_id, self.list_text(chat_id))),
            "clear" => {
                let removed = self.registry.clear_all(chat_id);
                let text = if removed == 0 {
                    "No jobs scheduled at the moment. Nothing to clear.".to_string()
                } else {
                    format!("{removed} jobs were removed from the queue.")
                };
                Some(OutboundMessage::text(chat_id, text))
            }
            other => {
                debug!(chat_id, command = other, "ignoring unknown command");
                None
            }
        }
    }

    fn on_text(&self, chat_id: ChatId, text: &str) -> Option<OutboundMessage> {
        let step = {
            let mut dialog = self.lock_dialog();
            if !dialog.accepts(chat_id, text) {
                debug!(chat_id, "message does not match the current intake stage");
                return None;
            }
            dialog.advance(chat_id, text)
        };

        match step {
            Ok(DialogStep::Next(stage)) => Some(self.prompt(chat_id, stage)),
            Ok(DialogStep::Completed(job)) => {
                self.registry.create(job);
                if let Some(keep_alive) = &self.keep_alive {
                    keep_alive.ensure_armed();
                }
                Some(OutboundMessage::text(
                    chat_id,
                    "Appointment monitor started. You will get a notification if an \
                     appointment is found.",
                ))
            }
            Ok(DialogStep::Aborted) => None,
            Err(err) => {
                warn!(chat_id, error = %err, "intake dialogue step failed");
                None
            }
        }
    }

    fn prompt(&self, chat_id: ChatId, stage: Stage) -> OutboundMessage {
        let (text, markup) = match stage {
            Stage::Location => (
                "Choose location:",
                ReplyMarkup::Choices(self.choice_labels(stage)),
            ),
            Stage::AppointmentType => (
                "Choose appointment type:",
                ReplyMarkup::Choices(self.choice_labels(stage)),
            ),
            Stage::NumPeople => (
                "Choose number of people:",
                ReplyMarkup::Choices(self.choice_labels(stage)),
            ),
            Stage::BeforeDate => (
                "Date before which to search for an appointment (dd-mm-yyyy):",
                ReplyMarkup::RemoveKeyboard,
            ),
        };

        OutboundMessage::text(chat_id, text).with_markup(markup)
    }

    fn choice_labels(&self, stage: Stage) -> Vec<String> {
        let dialog = self.lock_dialog();
        let catalog = dialog.catalog();
        match stage {
            Stage::Location => catalog
                .locations()
                .iter()
                .map(|entry| entry.label.clone())
                .collect(),
            Stage::AppointmentType => catalog
                .appointment_types()
                .iter()
                .map(|entry| entry.label.clone())
                .collect(),
            Stage::NumPeople => (MIN_PEOPLE..=MAX_PEOPLE).map(|n| n.to_string()).collect(),
            Stage::BeforeDate => Vec::new(),
        }
    }

    fn list_text(&self, chat_id: ChatId) -> String {
        let names = self.registry.list(chat_id);
        if names.is_empty() {
            return "No jobs scheduled at the moment.".to_string();
        }

        let lines: Vec<String> = names
            .iter()
            .enumerate()
            .map(|(index, name)| format!("{}) {name}", index + 1))
            .collect();
        format!("Currently looking for:\n{}", lines.join("\n"))
    }

    fn lock_dialog(&self) -> MutexGuard<'_, DialogController> {
        match self.dialog.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
