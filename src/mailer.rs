use crate::settings::SmtpSettings;
use lettre::message::header::{ContentType, ContentTypeErr};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const REGISTRATION_SUBJECT: &str = "Student Registration Successful";
const QR_ATTACHMENT_NAME: &str = "qr_code.png";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP_PASSWORD must be set to send mail")]
    MissingPassword(#[from] env::VarError),

    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("invalid content type: {0}")]
    ContentType(#[from] ContentTypeErr),

    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("could not send message: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Sends notification e-mails through an SMTP relay.
#[derive(Clone)]
pub struct Mailer {
    sender: Mailbox,
    transport: SmtpTransport,
}

impl Mailer {
    /// Creates a mailer for the configured relay, reading the password from the `SMTP_PASSWORD`
    /// environment variable.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, MailError> {
        dotenvy::dotenv().ok();
        let password = env::var("SMTP_PASSWORD")?;
        Self::new(settings, password)
    }

    pub fn new(settings: &SmtpSettings, password: String) -> Result<Self, MailError> {
        let transport = SmtpTransport::starttls_relay(&settings.host)?
            .credentials(Credentials::new(settings.username.clone(), password))
            .timeout(Some(Duration::from_secs(5)))
            .build();

        Ok(Self {
            sender: settings.sender.parse()?,
            transport,
        })
    }

    /// Builds the message that welcomes a newly registered student, with their QR code attached.
    pub fn registration_message(
        &self,
        to: &str,
        name: &str,
        qr_png: Vec<u8>,
    ) -> Result<Message, MailError> {
        let body = format!(
            "<p>Dear {},</p><p>Your registration was successful.</p>",
            tera::escape_html(name)
        );
        let attachment = Attachment::new(QR_ATTACHMENT_NAME.to_string())
            .body(qr_png, ContentType::parse("image/png")?);

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to.parse()?)
            .subject(REGISTRATION_SUBJECT)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(body))
                    .singlepart(attachment),
            )?;

        Ok(message)
    }

    /// Sends the registration e-mail. This blocks on the SMTP exchange.
    pub fn send_registration(&self, to: &str, name: &str, qr_png: Vec<u8>) -> Result<(), MailError> {
        let message = self.registration_message(to, name, qr_png)?;
        let response = self.transport.send(&message)?;
        info!(%to, code = %response.code(), "sent registration e-mail");
        Ok(())
    }
}
