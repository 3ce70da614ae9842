use serde::Serialize;

/// Что лежит в тексте QR кода, для информационной панели на странице
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentType {
    #[serde(rename = "URL")]
    Url,
    #[serde(rename = "Email")]
    Email,
    #[serde(rename = "Phone")]
    Phone,
    #[serde(rename = "Email (without mailto)")]
    BareEmail,
    #[serde(rename = "Phone (without TEL:)")]
    BarePhone,
    #[serde(rename = "Code")]
    Code,
    #[serde(rename = "Text")]
    Text,
}

impl ContentType {
    /// Порядок проверок важен: первая сработавшая побеждает
    pub fn detect(content: &str) -> Self {
        if content.starts_with("http://") || content.starts_with("https://") {
            return ContentType::Url;
        }
        if content.starts_with("mailto:") {
            return ContentType::Email;
        }
        if content.starts_with("TEL:") {
            return ContentType::Phone;
        }
        if content.contains('@') && content.contains('.') && !content.contains(' ') {
            return ContentType::BareEmail;
        }
        if content.chars().filter(|c| c.is_ascii_digit()).count() >= 7 {
            return ContentType::BarePhone;
        }
        if !content.is_empty()
            && content.chars().count() <= 10
            && content.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return ContentType::Code;
        }
        ContentType::Text
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContentType::Url => "URL",
            ContentType::Email => "Email",
            ContentType::Phone => "Phone",
            ContentType::BareEmail => "Email (without mailto)",
            ContentType::BarePhone => "Phone (without TEL:)",
            ContentType::Code => "Code",
            ContentType::Text => "Text",
        }
    }
}
