use crate::codec::Source;

/// Status lines returned by a port status request, one per requested source.
///
/// The firmware formats each line as a JSON member (`"BTA01_5V":{...}`) for
/// the analog ports, but the digital ports use a free-form layout, so the
/// JSON view is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    lines: Vec<String>,
    complete: bool,
}

impl StatusReport {
    pub fn new(lines: Vec<String>, complete: bool) -> Self {
        Self { lines, complete }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// False when the device stopped answering before every requested source
    /// had reported.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Body of the line reported for `source`, with its `"LABEL":` prefix
    /// removed.
    pub fn get(&self, source: Source) -> Option<&str> {
        let prefix = format!("\"{}\":", source.as_str());
        self.lines
            .iter()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .map(str::trim)
    }

    /// Join the lines into one JSON object. `None` if any line is not a
    /// well-formed member.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        let joined = format!("{{{}}}", self.lines.join(","));
        match serde_json::from_str::<serde_json::Value>(&joined) {
            Ok(value) if value.is_object() => Some(value),
            Ok(_) => None,
            Err(e) => {
                log::debug!("Status report is not JSON ({}): {}", e, joined);
                None
            }
        }
    }
}
