mod campaign;
mod recipient;
mod recipient_email;

pub use campaign::Campaign;
pub use campaign::SendResult;
pub use campaign::Sender;
pub use recipient::Recipient;
pub use recipient_email::RecipientEmail;
