use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::core::error::{Error, Result};
use crate::notify::{MailSecurity, MailSettings};

pub(super) async fn send(settings: MailSettings, subject: &str, body: &str) -> Result<()> {
    let server = settings.server.clone().unwrap_or_default().trim().to_string();
    let target = format!("smtp://{server}");
    let message = build_message(&settings, subject, body).map_err(Error::config)?;

    let mut builder = match settings.security {
        MailSecurity::Ssl => SmtpTransport::relay(&server),
        MailSecurity::StartTls => SmtpTransport::starttls_relay(&server),
        MailSecurity::Insecure => Ok(SmtpTransport::builder_dangerous(&server)),
    }
    .map_err(|err| Error::transport(&target, err.to_string()))?;
    if let Some(port) = settings.port {
        builder = builder.port(port);
    }
    if let (Some(login), Some(password)) = (&settings.login, &settings.password) {
        builder = builder.credentials(Credentials::new(
            login.trim().to_string(),
            password.trim().to_string(),
        ));
    }
    let transport = builder.build();

    tokio::task::spawn_blocking(move || transport.send(&message))
        .await
        .map_err(|err| Error::transport(&target, err.to_string()))?
        .map_err(|err| Error::transport(&target, err.to_string()))?;
    Ok(())
}

fn build_message(settings: &MailSettings, subject: &str, body: &str) -> std::result::Result<Message, String> {
    let mut builder = Message::builder()
        .from(mailbox(&settings.from)?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN);
    for address in addresses(&settings.to) {
        builder = builder.to(mailbox(address)?);
    }
    for address in settings.cc.iter().flat_map(|cc| addresses(cc)) {
        builder = builder.cc(mailbox(address)?);
    }
    for address in settings.bcc.iter().flat_map(|bcc| addresses(bcc)) {
        builder = builder.bcc(mailbox(address)?);
    }
    builder.body(body.to_string()).map_err(|err| err.to_string())
}

fn addresses(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|address| !address.is_empty())
}

fn mailbox(address: &str) -> std::result::Result<Mailbox, String> {
    address
        .trim()
        .parse()
        .map_err(|err| format!("invalid mail address {address}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_every_recipient() {
        let settings = MailSettings {
            from: "railcron@example.org".to_string(),
            to: "ops@example.org, lead@example.org".to_string(),
            cc: Some("audit@example.org".to_string()),
            ..MailSettings::default()
        };
        let message = build_message(&settings, "Error in flow hda", "body").expect("message");
        assert_eq!(message.envelope().to().len(), 3);
    }

    #[test]
    fn bad_address_is_rejected() {
        let settings = MailSettings {
            from: "not an address".to_string(),
            to: "ops@example.org".to_string(),
            ..MailSettings::default()
        };
        assert!(build_message(&settings, "s", "b").is_err());
    }
}
