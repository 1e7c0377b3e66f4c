//! 通知消息模型

use serde::{Deserialize, Serialize};

/// Side-channel message sent after a successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 收件地址
    pub to: String,
    /// 主题
    pub subject: String,
    /// HTML 正文
    pub html: String,
}

impl Notification {
    /// Builds a message from a template, substituting `{name}`.
    pub fn from_template(to: &str, subject: &str, html_template: &str, name: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.replace("{name}", name),
            html: html_template.replace("{name}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_template() {
        let n = Notification::from_template("a@b.test", "Hi {name}", "<p>{name}!</p>", "Elf");
        assert_eq!(n.subject, "Hi Elf");
        assert_eq!(n.html, "<p>Elf!</p>");
        assert_eq!(n.to, "a@b.test");
    }
}
