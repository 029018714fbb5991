//! Reply linkage across platforms.
//!
//! A reply on one platform points at a native message id. That id is
//! looked up among recorded artifacts to find the logical message, whose
//! copy on the other platform becomes the native reply target. When no such
//! copy exists the adapter sends a reply indicator instead.
//!
//! The new message's `reply_to` is back-filled after creation. Tasks that
//! read a message before its back-fill lands simply see no reply link.

use crate::common::error::StoreResult;
use crate::common::types::{Platform, PlatformMessageType};
use crate::store::{Author, Database, Message};

/// Outcome of resolving a quoted native id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyLink {
    /// Logical message the reply points at, if it was ever recorded.
    pub target: Option<Message>,
    pub target_author: Option<Author>,
    /// Native id of the target's canonical copy on the destination.
    pub native_target: Option<String>,
}

impl ReplyLink {
    pub fn needs_indicator(&self) -> bool {
        self.native_target.is_none()
    }
}

/// Resolve `quoted_native_id` (an id on `origin`) for message `message_id`
/// and back-fill its reply link.
pub fn link_reply(
    store: &Database,
    origin: Platform,
    quoted_native_id: &str,
    message_id: i64,
) -> StoreResult<ReplyLink> {
    let Some(quoted) = store.find_platform_message_by_native_id(origin, quoted_native_id)? else {
        return Ok(ReplyLink::default());
    };

    let target = store.find_message(quoted.message_id)?;
    let Some(target) = target else {
        return Ok(ReplyLink::default());
    };

    store.update_message_reply_to(message_id, target.id)?;

    let native_target = store
        .find_platform_message(target.id, origin.other(), &[PlatformMessageType::Message])?
        .map(|pm| pm.native_id);
    let target_author = store.find_author(target.author_id)?;

    Ok(ReplyLink {
        target: Some(target),
        target_author,
        native_target,
    })
}

/// Truncate `content` to `max_chars` characters, adding an ellipsis when
/// something was cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    let mut chars = content.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Line shown above a Discord message that replies to `link`. Webhooks
/// cannot carry a message reference.
pub fn jump_header(link: &str) -> String {
    format!("↪ <{}>\n", link)
}

/// Reply indicator text for WhatsApp.
pub fn whatsapp_indicator(author_name: &str, preview: &str) -> String {
    format!("Reply to '*<{}>* {}'", author_name, preview)
}
