//! HTML fragments pushed to live viewers.

use std::fmt::Write;

use wall_types::Message;

/// Marker the wall's client script uses to scroll new posts into view.
const AUTOSCROLL_MARKER: &str = r#"<span data-autoscroll="1" style="display:none"></span>"#;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one message as it appears on the wall.
pub fn message_fragment(message: &Message) -> String {
    let mut html = String::new();
    let _ = writeln!(
        html,
        r#"<article class="message" id="message-{}" data-pinned="{}">"#,
        message.id, message.pinned
    );

    let sender = message.sender_name.as_deref().unwrap_or("Anonymous");
    let _ = writeln!(
        html,
        r#"<header><span class="sender">{}</span> <time datetime="{}">{}</time></header>"#,
        escape_html(sender),
        message.created_at.to_rfc3339(),
        message.created_at.format("%H:%M"),
    );

    if !message.text.is_empty() {
        let _ = writeln!(html, r#"<p class="text">{}</p>"#, escape_html(&message.text));
    }

    if !message.images.is_empty() {
        html.push_str("<div class=\"images\">\n");
        for key in &message.images {
            let _ = writeln!(
                html,
                r#"<img class="message-image" data-image-key="{}" loading="lazy" alt="">"#,
                escape_html(key)
            );
        }
        html.push_str("</div>\n");
    }

    html.push_str("</article>");
    html
}

/// Payload published to the channel when a message is created.
pub fn live_payload(message: &Message) -> String {
    format!("{}{}", AUTOSCROLL_MARKER, message_fragment(message))
}
