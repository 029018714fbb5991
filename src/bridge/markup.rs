//! Inline emphasis conversion between Discord markdown and WhatsApp markup.

/// One delimiter rewrite: text wrapped in `wildcard` gets wrapped in
/// `open`/`close` instead.
#[derive(Debug, Clone, Copy)]
pub struct FormatRule {
    pub wildcard: &'static str,
    pub open: &'static str,
    pub close: &'static str,
}

const fn rule(wildcard: &'static str, tag: &'static str) -> FormatRule {
    FormatRule {
        wildcard,
        open: tag,
        close: tag,
    }
}

/// Discord markdown to WhatsApp. `_` means italic on both sides.
pub const DISCORD_TO_WHATSAPP: &[FormatRule] = &[
    rule("~~", "~"),
    rule("**", "*"),
    rule("*", "_"),
    rule("`", "```"),
];

/// WhatsApp markup to Discord markdown.
pub const WHATSAPP_TO_DISCORD: &[FormatRule] = &[
    rule("```", "`"),
    rule("~", "~~"),
    rule("*", "**"),
];

/// Rewrite every delimited span in `text` according to `rules`.
///
/// Rules are tried longest wildcard first so `**` is never read as two
/// `*`. A span must be non-empty and closed by the same wildcard; anything
/// else passes through untouched. Span contents are translated too.
pub fn translate(text: &str, rules: &[FormatRule]) -> String {
    let mut ordered: Vec<&FormatRule> = rules.iter().collect();
    ordered.sort_by(|a, b| b.wildcard.len().cmp(&a.wildcard.len()));
    translate_ordered(text, &ordered)
}

fn translate_ordered(text: &str, rules: &[&FormatRule]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    'scan: while !rest.is_empty() {
        for rule in rules {
            let Some(after) = rest.strip_prefix(rule.wildcard) else {
                continue;
            };
            match after.find(rule.wildcard) {
                Some(end) if end > 0 => {
                    out.push_str(rule.open);
                    out.push_str(&translate_ordered(&after[..end], rules));
                    out.push_str(rule.close);
                    rest = &after[end + rule.wildcard.len()..];
                    continue 'scan;
                }
                _ => {}
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    out
}
