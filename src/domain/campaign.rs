use uuid::Uuid;

use crate::domain::Recipient;

/// The sending identity, as it appears in personalization tokens and in the
/// provider `From` field.
#[derive(Debug, Clone)]
pub struct Sender {
    pub name: String,
    pub email: String,
    pub title: String,
    pub profile_picture: String,
}

impl Sender {
    /// `Name <address>` form for the provider `From` field.
    pub fn from_field(&self) -> String { format!("{} <{}>", self.name, self.email) }
}

/// One logical bulk-send run: a single template, sender, recipient set, and
/// optional schedule.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub from: Sender,
    pub subject: String,
    pub body_template: String,

    /// Base name of the template file; feeds the `utm_content` tag on
    /// rewritten scheduling links.
    pub template_name: String,

    pub recipients: Vec<Recipient>,

    /// Provider-formatted timestamp (RFC 2822). `None` sends immediately.
    pub schedule_time: Option<String>,

    /// Correlation token injected into outbound tracking links; generated
    /// once and stable for the whole run.
    pub campaign_id: String,
}

impl Campaign {
    pub fn new(
        from: Sender,
        subject: String,
        body_template: String,
        template_name: String,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            from,
            subject,
            body_template,
            template_name,
            recipients,
            schedule_time: None,
            campaign_id: Uuid::new_v4().to_string(),
        }
    }

    /// Only recipients that passed ingestion validation are ever dispatched.
    pub fn valid_recipients(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter().filter(|r| r.valid)
    }
}

/// Terminal outcome for one recipient. Only the final attempt's result is
/// kept when a send is retried.
#[derive(Debug, Clone)]
pub struct SendResult {
    pub email: String,
    pub success: bool,

    /// Present iff the provider returned a message identifier for a
    /// successful send.
    pub provider_message_id: Option<String>,

    /// Present iff the send failed.
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(
        email: String,
        provider_message_id: Option<String>,
    ) -> Self {
        Self {
            email,
            success: true,
            provider_message_id,
            error: None,
        }
    }

    pub fn failed(
        email: String,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            email,
            success: false,
            provider_message_id: None,
            error: Some(error.to_string()),
        }
    }
}
