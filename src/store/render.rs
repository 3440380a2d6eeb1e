//! Textual renderings of a blocklist.

/// Output encodings for a rendered blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    /// One entry per line. This is also the persisted format.
    Plain,
    /// `/etc/hosts` lines pointing every entry at 0.0.0.0.
    Hosts,
    /// Adblock Plus filter rules.
    Adblock,
}

impl ListFormat {
    /// Comment marker used for header lines in this format.
    fn comment_marker(self) -> char {
        match self {
            ListFormat::Plain | ListFormat::Hosts => '#',
            ListFormat::Adblock => '!',
        }
    }

    fn entry_line(self, entry: &str) -> String {
        match self {
            ListFormat::Plain => entry.to_string(),
            ListFormat::Hosts => format!("0.0.0.0\t{entry}"),
            ListFormat::Adblock => format!("||{entry}^"),
        }
    }
}

/// Serializes `entries` under a comment header.
///
/// Every line of `header` becomes a comment line, then one blank line, then
/// one entry per line. Entries are emitted in the order given; sorting is
/// the writer's business, not the renderer's.
pub fn render(entries: &[String], format: ListFormat, header: &str) -> String {
    let mut out = String::new();
    for line in header.split('\n') {
        out.push(format.comment_marker());
        out.push(' ');
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    for entry in entries {
        out.push_str(&format.entry_line(entry));
        out.push('\n');
    }
    out
}
