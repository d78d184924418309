// src/bot/messages.rs - Outgoing message templates and variable substitution

use serde::{Deserialize, Serialize};

use crate::types::Event;

/// Every text the engine posts. Loaded from `templates.yaml` when present;
/// missing fields fall back to the built-in defaults.
///
/// Templates use `$(name)` placeholders. Telegram messages are sent with
/// HTML parse mode, so anything user-supplied is escaped before substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub welcome: String,
    pub banned_notice: String,
    pub auto_remove_notice: String,
    pub faq_reply: String,
    pub dont_link: String,
    pub dont_link_group_test: String,
    pub unsupported_format: String,
    pub unsupported_command: String,
    pub newbie_announcement: String,
    pub safety_tips: Vec<String>,
    pub safety_intro: String,
    pub safety_links: Vec<String>,
    pub lastcall: String,
    pub lastcall_donor_note: String,
    pub lastcall_usage: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            welcome: "$(mention)Welcome to the community! 🎉\n\n\
                We've gathered answers to the most common newbie questions in the \
                <b>Rules & Guides</b> thread. Once you've read through them, feel free to post \
                follow-up questions in the <i>Newbies</i> thread. Happy to have you here! 😊"
                .to_string(),
            banned_notice: "$(mention)$(header)\n\nauto-moderated term: $(term)\n$(detail)".to_string(),
            auto_remove_notice: "$(mention)$(header)\n\nauto-moderated term: $(term)\n$(detail)".to_string(),
            faq_reply: "$(header)\n\n$(detail)".to_string(),
            dont_link: "$(mention)💨🚫 We're auto-poofing this direct link. Most communities ask that \
                invites are shared only through approved links.\n\n\
                Please DM these kinds of links instead, and stay vigilant when receiving DMs. Thank you! 🙏"
                .to_string(),
            dont_link_group_test: "$(mention)💨🚫 Ope! Group testing coordination has moved off this chat. \
                Please post the name of your open group test instead of a direct invite link so folks \
                can find it through the approved channel. 🙏"
                .to_string(),
            unsupported_format: "😳🚧 Oops! We cannot parse this test result. \
                Please upload a clear PDF or screenshot of the lab report."
                .to_string(),
            unsupported_command: "tehehe stop poking me. this command doesn't do anything.".to_string(),
            newbie_announcement: "🚨 New here? Start here! 🚨\n\n\
                1) Read the Rules & Guides thread.\n\
                2) Ask follow-up questions in the Newbies thread.\n\n\
                ⚠️ <b>Safety Tip:</b> $(tip)"
                .to_string(),
            safety_tips: vec![
                "Never trust unsolicited DMs. Scammers often impersonate vendor reps.".to_string(),
                "Vendor COAs only show what the vendor claims to sell. Test your actual order!".to_string(),
                "Check the pH of reconstituted peptides before injecting. 🧪".to_string(),
            ],
            safety_intro: "Did someone say Safety? 👀\n\nIf you haven't already seen this one...\n\n$(link)"
                .to_string(),
            safety_links: vec![
                "Always check your reconstituted peptide's pH level before injecting! 🧪📈".to_string(),
                "Third-party test what you buy. Results beat promises. 🔍".to_string(),
            ],
            lastcall: "<b>⚠️ FINAL CALL, Researchers! ⚠️</b>\n\n\
                This is the time to confirm your participation in the group test! \
                The test closes in <b>24 hours</b>.\n\n\
                <b>Cost Breakdown:</b>\n\
                - <b>Total cost:</b> $$(cost)\n\
                - <b>Cost per member:</b>\n  $$(split) (non-vial)\n  $$(donor_split) (vial donor)$(donor_note)\n\n\
                IF YOU WISH TO PARTICIPATE, PLEASE REACT TO THIS MESSAGE ✅"
                .to_string(),
            lastcall_donor_note: "✨ <b>NOTE:</b> Each vial donor contributes an effective value of \
                $$(vdvalue) by providing a vial, which is accounted for in the calculation."
                .to_string(),
            lastcall_usage: "💡<b>Use the following command to calculate the test group split:</b>\n\n\
                <code>/lastcall cost=600 vialdonors=2 vdvalue=20</code>"
                .to_string(),
        }
    }
}

/// Substitute `$(name)` placeholders in one pass and trim the result.
/// Unknown placeholders are left as written; substituted values are never rescanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("$(") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find(')') else {
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let name = &after[..end];
        match vars.iter().find(|(var, _)| *var == name) {
            Some((_, value)) => output.push_str(value),
            None => output.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    output.trim().to_string()
}

/// Minimal escaping for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Clickable mention of the event's sender, followed by a space
pub fn mention(event: &Event) -> String {
    let name = event
        .sender_handle
        .as_deref()
        .or(event.sender_display_name.as_deref())
        .unwrap_or(&event.sender_id);
    format!(
        "<a href='tg://user?id={}'>@{}</a> ",
        escape_html(&event.sender_id),
        escape_html(name)
    )
}

impl MessageTemplates {
    pub fn welcome(&self, event: &Event) -> String {
        render(&self.welcome, &[("mention", &mention(event))])
    }

    /// Welcome text without addressing anyone, used by `/newbie`
    pub fn welcome_anonymous(&self) -> String {
        render(&self.welcome, &[("mention", "")])
    }

    pub fn banned_notice(&self, event: &Event, header: &str, term: &str, detail: Option<&str>) -> String {
        Self::notice(&self.banned_notice, event, header, term, detail)
    }

    pub fn auto_remove_notice(&self, event: &Event, header: &str, term: &str, detail: Option<&str>) -> String {
        Self::notice(&self.auto_remove_notice, event, header, term, detail)
    }

    fn notice(template: &str, event: &Event, header: &str, term: &str, detail: Option<&str>) -> String {
        render(
            template,
            &[
                ("mention", &mention(event)),
                ("header", header),
                ("term", &escape_html(term)),
                ("detail", detail.unwrap_or("")),
            ],
        )
    }

    pub fn faq_reply(&self, header: &str, detail: Option<&str>) -> String {
        render(&self.faq_reply, &[("header", header), ("detail", detail.unwrap_or(""))])
    }

    pub fn dont_link(&self, event: &Event, group_test: bool) -> String {
        let template = if group_test { &self.dont_link_group_test } else { &self.dont_link };
        render(template, &[("mention", &mention(event))])
    }

    pub fn newbie_announcement(&self, tip: &str) -> String {
        render(&self.newbie_announcement, &[("tip", tip)])
    }

    pub fn safety(&self, link: &str) -> String {
        render(&self.safety_intro, &[("link", link)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    fn event(handle: Option<&str>) -> Event {
        Event {
            kind: EventKind::Message,
            chat_id: "-100".to_string(),
            thread_id: None,
            message_id: "7".to_string(),
            sender_id: "42".to_string(),
            sender_handle: handle.map(str::to_string),
            sender_display_name: Some("Sam".to_string()),
            raw_text: String::new(),
            normalized_text: String::new(),
            has_document: false,
            has_photo: false,
            attachment_file_id: None,
            membership: None,
        }
    }

    #[test]
    fn test_banned_notice_layout() {
        let templates = MessageTemplates::default();
        let text = templates.banned_notice(&event(Some("sam")), "Unsafe substance", "DNP", None);

        assert_eq!(
            text,
            "<a href='tg://user?id=42'>@sam</a> Unsafe substance\n\nauto-moderated term: DNP"
        );
    }

    #[test]
    fn test_notice_includes_detail() {
        let templates = MessageTemplates::default();
        let text = templates.auto_remove_notice(&event(None), "No links", "t.me/", Some("Use DMs."));

        assert!(text.starts_with("<a href='tg://user?id=42'>@Sam</a> No links"));
        assert!(text.ends_with("auto-moderated term: t.me/\nUse DMs."));
    }

    #[test]
    fn test_mention_escapes_html() {
        let mut e = event(None);
        e.sender_display_name = Some("<b>x</b>".to_string());

        assert_eq!(mention(&e), "<a href='tg://user?id=42'>@&lt;b&gt;x&lt;/b&gt;</a> ");
    }

    #[test]
    fn test_templates_yaml_overrides_single_field() {
        let templates: MessageTemplates = serde_yaml::from_str("faq_reply: \"Q: $(header)\"\n").unwrap();

        assert_eq!(templates.faq_reply("Amo", None), "Q: Amo");
        assert_eq!(templates.dont_link, MessageTemplates::default().dont_link);
    }

    #[test]
    fn test_dollar_sign_before_placeholder() {
        assert_eq!(render("$$(cost)", &[("cost", "600")]), "$600");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let text = render("$(mention)$(header)", &[("mention", "$(header) "), ("header", "H")]);
        assert_eq!(text, "$(header) H");
        assert_eq!(render("keep $(unknown) and $(", &[]), "keep $(unknown) and $(");
    }
}
