//! Small text helpers shared by the router and the adapter.
//!
//! Telegram HTML supports only a small tag subset (`<b>`, `<i>`, `<code>`,
//! `<pre>`, `<a href>`), so relayed user text must always be escaped.

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Tag a user's message with their identity before it reaches the admin.
pub fn tag_user_message(display_name: &str, user_id: i64, text: &str) -> String {
    format!(
        "💬 <b>{}</b> (id <code>{user_id}</code>)\n\n{}",
        escape_html(display_name),
        escape_html(text)
    )
}

/// Tag an admin reply before it reaches the user.
pub fn tag_admin_message(text: &str) -> String {
    format!("👨‍💼 <b>Studio:</b> {}", escape_html(text))
}

/// Wrap a broadcast body in the studio announcement frame.
pub fn tag_broadcast(text: &str) -> String {
    format!("📢 <b>A message from the studio:</b>\n\n{}", escape_html(text))
}

pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(escape_html("<b> & \"q\""), "&lt;b&gt; &amp; &quot;q&quot;");
    }

    #[test]
    fn user_tag_escapes_both_name_and_body() {
        let tagged = tag_user_message("Eve <script>", 7, "1 < 2");
        assert!(tagged.contains("Eve &lt;script&gt;"));
        assert!(tagged.contains("1 &lt; 2"));
        assert!(tagged.contains("<code>7</code>"));
    }

    #[test]
    fn duration_picks_the_two_leading_units() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3700), "1h 1m");
        assert_eq!(format_duration(-5), "0s");
    }
}
