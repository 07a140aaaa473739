use validator::ValidateEmail;

/// A validated email address; used for both senders and recipients.
///
/// Validation is RFC-5322-lite: whatever `validator` accepts, plus a
/// dot-bearing domain suffix, which the provider rejects delivery to
/// otherwise.
#[derive(Debug, Clone)]
pub struct RecipientEmail(String);

impl RecipientEmail {
    pub fn parse(email: String) -> Result<Self, String> {
        let dotted_domain = email
            .rsplit_once('@')
            .map(|(_, domain)| domain.contains('.'))
            .unwrap_or(false);
        (ValidateEmail::validate_email(&email) && dotted_domain)
            // https://stackoverflow.com/a/65012849
            .then_some(Self(email.clone()))
            .ok_or(format!("Invalid email: {email:?}"))
    }
}

impl AsRef<str> for RecipientEmail {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for RecipientEmail {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
