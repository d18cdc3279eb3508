use std::time::Duration;

/// One command to send to the session and what to wait for afterwards.
///
/// Without an explicit `expect`, the session waits for its current prompt.
/// Without an explicit `timeout`, the session default applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    command: String,
    expect: Option<String>,
    timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            expect: None,
            timeout: None,
        }
    }

    /// Build a command line from separate words, joined with single spaces.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::new(words.join(" "))
    }

    pub fn expect(mut self, pattern: impl Into<String>) -> Self {
        self.expect = Some(pattern.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn expected(&self) -> Option<&str> {
        self.expect.as_deref()
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args_joins_with_spaces() {
        let inv = Invocation::from_args(["mdadm", "--create", "/dev/md0", "--level=5"]);
        assert_eq!(inv.command(), "mdadm --create /dev/md0 --level=5");
        assert_eq!(inv.expected(), None);
    }

    #[test]
    fn test_builder() {
        let inv = Invocation::new("n")
            .expect("Partition number")
            .timeout(Duration::from_secs(5));
        assert_eq!(inv.command(), "n");
        assert_eq!(inv.expected(), Some("Partition number"));
        assert_eq!(inv.timeout_override(), Some(Duration::from_secs(5)));
    }
}
