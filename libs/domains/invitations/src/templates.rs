//! Invitation email templates.
//!
//! Handlebars renders both the HTML and the plain-text part. The HTML
//! templates escape interpolated values except the link, which is built from
//! configured base URLs. The text templates use triple braces throughout.

use crate::error::InvitationResult;
use handlebars::Handlebars;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Which of the two invitation emails is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvitationTemplate {
    /// The invitee already has an account: point them at the event dashboard.
    AccountInvite,
    /// No account yet: point them at signup with the event attached.
    JoinPlatform,
}

impl InvitationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationTemplate::AccountInvite => "account_invite",
            InvitationTemplate::JoinPlatform => "join_platform",
        }
    }

    fn html_name(&self) -> &'static str {
        match self {
            InvitationTemplate::AccountInvite => "account_invite_html",
            InvitationTemplate::JoinPlatform => "join_platform_html",
        }
    }

    fn text_name(&self) -> &'static str {
        match self {
            InvitationTemplate::AccountInvite => "account_invite_text",
            InvitationTemplate::JoinPlatform => "join_platform_text",
        }
    }

    pub fn subject(&self, event_title: &str) -> String {
        match self {
            InvitationTemplate::AccountInvite => format!("You're invited to {event_title}!"),
            InvitationTemplate::JoinPlatform => format!("Join {event_title} on Our Platform!"),
        }
    }
}

impl fmt::Display for InvitationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values interpolated into either template.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationEmailData {
    pub greeting_name: String,
    pub event_title: String,
    /// Dashboard link or signup link, depending on the template.
    pub link: String,
    /// Visible text of the link.
    pub link_label: String,
}

/// Rendered email content.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Template engine with both invitation templates registered.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new() -> InvitationResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        handlebars.register_template_string("account_invite_html", ACCOUNT_INVITE_HTML_TEMPLATE)?;
        handlebars.register_template_string("account_invite_text", ACCOUNT_INVITE_TEXT_TEMPLATE)?;
        handlebars.register_template_string("join_platform_html", JOIN_PLATFORM_HTML_TEMPLATE)?;
        handlebars.register_template_string("join_platform_text", JOIN_PLATFORM_TEXT_TEMPLATE)?;

        Ok(Self { handlebars })
    }

    pub fn render(
        &self,
        template: InvitationTemplate,
        data: &InvitationEmailData,
    ) -> InvitationResult<RenderedEmail> {
        debug!(template = %template, event_title = %data.event_title, "Rendering invitation email");

        let html = self.handlebars.render(template.html_name(), data)?;
        let text = self.handlebars.render(template.text_name(), data)?;

        Ok(RenderedEmail {
            subject: template.subject(&data.event_title),
            html,
            text,
        })
    }
}

const ACCOUNT_INVITE_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333;">
  <p>Hi {{greeting_name}},</p>
  <p>You've been invited to {{event_title}}!</p>
  <p>Check your dashboard at <a href="{{{link}}}">{{link_label}}</a> for details.</p>
</body>
</html>
"#;

const ACCOUNT_INVITE_TEXT_TEMPLATE: &str = r#"Hi {{{greeting_name}}},

You've been invited to {{{event_title}}}!

Check your dashboard for details: {{{link}}}
"#;

const JOIN_PLATFORM_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333;">
  <p>Hi {{greeting_name}},</p>
  <p>You've been invited to {{event_title}}!</p>
  <p>Please register at <a href="{{{link}}}">{{link_label}}</a> to join the event.</p>
</body>
</html>
"#;

const JOIN_PLATFORM_TEXT_TEMPLATE: &str = r#"Hi {{{greeting_name}}},

You've been invited to {{{event_title}}}!

Please register to join the event: {{{link}}}
"#;
