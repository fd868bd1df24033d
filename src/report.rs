/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::Display;

/// Plain-text report builder for the admin commands.
pub struct Report {
    content: String,
}

impl Report {
    pub fn new(title: String) -> Self {
        let text = title.replace("\n", " ");
        let underline = "=".repeat(text.len());
        Self {
            content: format!("{}\n{}\n\n", text, underline),
        }
    }

    pub fn heading(&mut self, text: String) {
        let text = text.replace("\n", " ");
        let underline = "-".repeat(text.len());
        self.content
            .push_str(&format!("{}\n{}\n", text, underline));
    }

    pub fn line(&mut self, text: String) {
        self.content.push_str(&text);
        self.content.push('\n');
    }

    pub fn field(&mut self, name: &str, value: impl Display) {
        self.content.push_str(&format!("{}: {}\n", name, value));
    }

    pub fn blank(&mut self) {
        self.content.push('\n');
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_and_fields() {
        let mut report = Report::new("backend\nstatus".to_owned());
        report.heading("totals".to_owned());
        report.field("files", 42);
        let expected = r#"
backend status
==============

totals
------
files: 42
"#
        .trim_start();
        assert_eq!(expected.to_owned(), report.to_string());
    }
}
