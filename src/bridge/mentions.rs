//! Cross-platform mention rewriting.

use fancy_regex::Regex;
use tracing::{debug, warn};

use super::BridgeContext;
use crate::common::{Mention, Platform};

/// Text with mentions rewritten, plus the destination ids allowed to ping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedMentions {
    pub text: String,
    pub allow_list: Vec<String>,
}

/// Rewrite the `source` platform's mention tokens in `text` for the other
/// platform.
///
/// Users with a linked identity on the destination become live mentions
/// and are allow-listed. Everyone else becomes a plain `@name` written in
/// the source dialect, so markup translation still applies to it.
pub async fn resolve_mentions(
    ctx: &BridgeContext,
    source: Platform,
    text: &str,
    mentions: &[Mention],
) -> anyhow::Result<ResolvedMentions> {
    let destination = source.other();
    let mut resolved = ResolvedMentions {
        text: text.to_string(),
        allow_list: Vec::new(),
    };

    for mention in mentions {
        let author = ctx.store.find_author_by_native_id(source, &mention.native_id)?;

        let linked = match author.as_ref().and_then(|a| a.native_id(destination)) {
            Some(destination_id) => {
                match ctx.sender_for(destination).resolve_contact(destination_id).await {
                    Ok(Some(contact)) => Some((destination_id.to_string(), contact)),
                    Ok(None) => None,
                    Err(e) => {
                        warn!(%destination, user = destination_id, "Failed to resolve contact: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let replacement = match linked {
            Some((destination_id, contact)) => {
                if !resolved.allow_list.contains(&contact) {
                    resolved.allow_list.push(contact);
                }
                destination.mention(&destination_id)
            }
            None => {
                let name = author
                    .as_ref()
                    .map(|a| a.display_name.as_str())
                    .unwrap_or(&mention.display_name);
                debug!(%source, user = %mention.native_id, "No linked identity, using plain mention");
                source.plain_mention(name)
            }
        };

        for token in source.mention_tokens(&mention.native_id) {
            resolved.text = replace_token(&resolved.text, &token, &replacement)?;
        }
    }

    Ok(resolved)
}

/// Replace whole occurrences of `token`. `@316` must not match the start
/// of `@31612`.
fn replace_token(text: &str, token: &str, replacement: &str) -> anyhow::Result<String> {
    let pattern = Regex::new(&format!(r"{}(?!\d)", fancy_regex::escape(token)))?;
    Ok(pattern
        .replace_all(text, |_: &fancy_regex::Captures| -> String { replacement.to_string() })
        .into_owned())
}
