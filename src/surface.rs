// surface.rs - Chat Rendering Surface
// The only place that turns picker views and progress text into Discord
// messages. The dispatcher and the cache poller talk to `ChatSurface`, never
// to serenity directly.

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::application::component::ButtonStyle;
use serenity::model::channel::ReactionType;
use serenity::model::id::{ChannelId, MessageId};
use std::sync::Arc;
use thiserror::Error;

use crate::paging::{PickerView, MAX_LABEL_LEN};
use crate::store::Surface;

/// Custom ids carried by the picker components.
pub const PICK_MENU_ID: &str = "vod:pick";
pub const PREV_BUTTON_ID: &str = "vod:prev";
pub const NEXT_BUTTON_ID: &str = "vod:next";

#[derive(Debug, Error)]
#[error("platform rejected {action}: {reason}")]
pub struct RenderError {
    pub action: &'static str,
    pub reason: String,
}

impl RenderError {
    pub fn new(action: &'static str, reason: impl ToString) -> Self {
        Self {
            action,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
pub trait ChatSurface: Send + Sync {
    async fn send_picker(&self, channel: ChannelId, view: &PickerView) -> Result<MessageId, RenderError>;

    async fn edit_picker(
        &self,
        channel: ChannelId,
        message: MessageId,
        view: &PickerView,
    ) -> Result<(), RenderError>;

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<MessageId, RenderError>;

    /// Replace the message content and drop any components it carried.
    async fn edit_text(&self, channel: ChannelId, message: MessageId, text: &str) -> Result<(), RenderError>;

    async fn react(&self, channel: ChannelId, message: MessageId, emoji: &str) -> Result<(), RenderError>;
}

pub struct DiscordSurface {
    http: Arc<Http>,
}

impl DiscordSurface {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

// Legacy pickers are plain text with a numbered list; the header carries it.
fn picker_content(view: &PickerView) -> String {
    if view.options.is_empty() {
        format!("{}\n\nNothing to choose from.", view.header)
    } else {
        view.header.clone()
    }
}

fn build_components<'a>(
    components: &'a mut serenity::builder::CreateComponents,
    view: &PickerView,
) -> &'a mut serenity::builder::CreateComponents {
    if view.surface == Surface::Reactions || view.options.is_empty() {
        return components;
    }

    components.create_action_row(|row| {
        row.create_select_menu(|menu| {
            menu.custom_id(PICK_MENU_ID)
                .placeholder(&view.placeholder)
                .min_values(1)
                .max_values(1)
                .options(|opts| {
                    for option in &view.options {
                        opts.create_option(|o| {
                            o.label(&option.label).value(&option.value);
                            if !option.description.is_empty() {
                                o.description(crate::paging::truncate_label(
                                    &option.description,
                                    MAX_LABEL_LEN,
                                ));
                            }
                            o
                        });
                    }
                    opts
                })
        })
    });

    if let Some(nav) = view.navigation {
        components.create_action_row(|row| {
            row.create_button(|b| {
                b.custom_id(PREV_BUTTON_ID)
                    .label("◀ Prev")
                    .style(ButtonStyle::Secondary)
                    .disabled(!nav.prev_enabled)
            })
            .create_button(|b| {
                b.custom_id(NEXT_BUTTON_ID)
                    .label("Next ▶")
                    .style(ButtonStyle::Secondary)
                    .disabled(!nav.next_enabled)
            })
        });
    }

    components
}

#[async_trait]
impl ChatSurface for DiscordSurface {
    async fn send_picker(&self, channel: ChannelId, view: &PickerView) -> Result<MessageId, RenderError> {
        let message = channel
            .send_message(&self.http, |m| {
                m.content(picker_content(view))
                    .components(|c| build_components(c, view))
            })
            .await
            .map_err(|e| RenderError::new("picker send", e))?;
        Ok(message.id)
    }

    async fn edit_picker(
        &self,
        channel: ChannelId,
        message: MessageId,
        view: &PickerView,
    ) -> Result<(), RenderError> {
        channel
            .edit_message(&self.http, message, |m| {
                m.content(picker_content(view))
                    .components(|c| build_components(c, view))
            })
            .await
            .map_err(|e| RenderError::new("picker edit", e))?;
        Ok(())
    }

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<MessageId, RenderError> {
        let message = channel
            .send_message(&self.http, |m| m.content(text))
            .await
            .map_err(|e| RenderError::new("message send", e))?;
        Ok(message.id)
    }

    async fn edit_text(&self, channel: ChannelId, message: MessageId, text: &str) -> Result<(), RenderError> {
        channel
            .edit_message(&self.http, message, |m| m.content(text).components(|c| c))
            .await
            .map_err(|e| RenderError::new("message edit", e))?;
        Ok(())
    }

    async fn react(&self, channel: ChannelId, message: MessageId, emoji: &str) -> Result<(), RenderError> {
        channel
            .create_reaction(&self.http, message, ReactionType::Unicode(emoji.to_string()))
            .await
            .map_err(|e| RenderError::new("reaction", e))
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Recording surface used by dispatcher and poller tests.
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Rendered {
        Picker(MessageId, PickerView),
        PickerEdit(MessageId, PickerView),
        Text(MessageId, String),
        TextEdit(MessageId, String),
        Reaction(MessageId, String),
    }

    pub(crate) struct RecordingSurface {
        next_id: AtomicU64,
        pub(crate) log: Mutex<Vec<Rendered>>,
        pub(crate) fail_edits: AtomicBool,
    }

    impl RecordingSurface {
        pub(crate) fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1000),
                log: Mutex::new(Vec::new()),
                fail_edits: AtomicBool::new(false),
            }
        }

        pub(crate) fn rendered(&self) -> Vec<Rendered> {
            self.log.lock().expect("surface log poisoned").clone()
        }

        pub(crate) fn text_edits(&self) -> Vec<String> {
            self.rendered()
                .into_iter()
                .filter_map(|r| match r {
                    Rendered::TextEdit(_, text) => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, item: Rendered) {
            self.log.lock().expect("surface log poisoned").push(item);
        }

        fn edit_allowed(&self) -> Result<(), RenderError> {
            if self.fail_edits.load(Ordering::SeqCst) {
                Err(RenderError::new("edit", "forced failure"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ChatSurface for RecordingSurface {
        async fn send_picker(&self, _channel: ChannelId, view: &PickerView) -> Result<MessageId, RenderError> {
            let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.record(Rendered::Picker(id, view.clone()));
            Ok(id)
        }

        async fn edit_picker(
            &self,
            _channel: ChannelId,
            message: MessageId,
            view: &PickerView,
        ) -> Result<(), RenderError> {
            self.edit_allowed()?;
            self.record(Rendered::PickerEdit(message, view.clone()));
            Ok(())
        }

        async fn send_text(&self, _channel: ChannelId, text: &str) -> Result<MessageId, RenderError> {
            let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.record(Rendered::Text(id, text.to_string()));
            Ok(id)
        }

        async fn edit_text(&self, _channel: ChannelId, message: MessageId, text: &str) -> Result<(), RenderError> {
            self.edit_allowed()?;
            self.record(Rendered::TextEdit(message, text.to_string()));
            Ok(())
        }

        async fn react(&self, _channel: ChannelId, message: MessageId, emoji: &str) -> Result<(), RenderError> {
            self.record(Rendered::Reaction(message, emoji.to_string()));
            Ok(())
        }
    }
}
