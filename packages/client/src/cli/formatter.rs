//! Message formatting utilities for the terminal client.

use chatline_shared::time::timestamp_to_clock_time;

use crate::{
    connection::{ChannelEvent, ConnectionState},
    domain::{Message, MessageState, RoomId, SenderId},
};

const RULE: &str = "============================================================";

/// Message formatter for console output
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the banner shown after entering a room
    ///
    /// # Arguments
    ///
    /// * `room_id` - The room just entered
    /// * `messages` - The room's cached history, oldest first
    /// * `me` - The local user, whose messages get a `(me)` mark
    ///
    /// # Returns
    ///
    /// A formatted string with the room header and its history
    pub fn format_room_entered(room_id: RoomId, messages: &[Message], me: &SenderId) -> String {
        let mut output = String::new();
        output.push('\n');
        output.push_str(RULE);
        output.push('\n');
        output.push_str(&format!("Room {}\n", room_id));
        output.push_str("------------------------------------------------------------\n");

        if messages.is_empty() {
            output.push_str("  (No messages yet)\n");
        } else {
            for message in messages {
                output.push_str("  ");
                output.push_str(&Self::format_line(message, me));
                output.push('\n');
            }
        }

        output.push_str(RULE);
        output.push('\n');
        output
    }

    /// Format a chat message arriving while the prompt is shown
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    /// * `me` - The local user
    ///
    /// # Returns
    ///
    /// A formatted string surrounded by blank lines
    pub fn format_chat_message(message: &Message, me: &SenderId) -> String {
        format!("\n{}\n", Self::format_line(message, me))
    }

    fn format_line(message: &Message, me: &SenderId) -> String {
        let author = if &message.sender_id == me {
            format!("@{} (me)", message.sender_id)
        } else {
            format!("@{}", message.sender_id)
        };
        let status = match &message.state {
            MessageState::Confirmed(id) => format!(
                "#{}, sent at {}",
                id,
                timestamp_to_clock_time(message.sent_at.value())
            ),
            MessageState::Pending(_) => "sending...".to_string(),
            MessageState::Failed(_) => "not sent".to_string(),
        };
        format!("{}: {} ({})", author, message.body, status)
    }

    /// Format a connection status change
    pub fn format_status(state: ConnectionState) -> String {
        match state {
            ConnectionState::Connected => "\n* connected\n".to_string(),
            ConnectionState::Reconnecting => "\n* connection lost, reconnecting...\n".to_string(),
            other => format!("\n* {}\n", other),
        }
    }

    /// Format channel notices other than chat messages and status changes
    ///
    /// Returns `None` for events that are not worth printing.
    pub fn format_notice(event: &ChannelEvent) -> Option<String> {
        match event {
            ChannelEvent::SubscriptionError { room_id, reason } => Some(format!(
                "\n! room {} refused the subscription: {}\n",
                room_id, reason
            )),
            ChannelEvent::ReconnectStalled { attempts } => Some(format!(
                "\n{}\n! still unable to reach the server after {} attempts\n{}\n",
                RULE, attempts, RULE
            )),
            ChannelEvent::HistoryIncomplete(room_id) => Some(format!(
                "\n! some messages of room {} could not be loaded\n",
                room_id
            )),
            ChannelEvent::Status(_) | ChannelEvent::Message(_) | ChannelEvent::Subscribed(_) => {
                None
            }
        }
    }

    /// Format the result of `/older`
    pub fn format_older_loaded(count: usize) -> String {
        if count == 0 {
            "\n* no older messages\n".to_string()
        } else {
            format!("\n* loaded {} older messages\n", count)
        }
    }

    /// Format an error surfaced to the user
    pub fn format_error(error: &dyn std::fmt::Display) -> String {
        format!("\n! {}\n", error)
    }
}
