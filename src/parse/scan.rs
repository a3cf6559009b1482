//! Finds marker-prefixed command lines in free-form comment text.

use super::types::CommandLine;

/// The character that introduces a command at the start of a line.
pub const DEFAULT_MARKER: char = '/';

/// Scan `text` for commands introduced by [`DEFAULT_MARKER`].
pub fn scan(text: &str) -> Vec<CommandLine> {
    Scanner::default().scan(text)
}

/// Line scanner for a single marker character.
///
/// A physical line yields a command only when, after trimming, it starts with
/// the marker and the marker is immediately followed by a non-whitespace
/// character. A marker anywhere else on the line never matches, so at most one
/// command is recognized per line. Lines are never joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scanner {
    marker: char,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl Scanner {
    pub fn new(marker: char) -> Self {
        Self { marker }
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    /// Collect every command in `text`, in line order.
    pub fn scan(&self, text: &str) -> Vec<CommandLine> {
        self.commands(text).collect()
    }

    /// Lazily iterate over the commands in `text`, in line order.
    pub fn commands<'a>(&self, text: &'a str) -> impl Iterator<Item = CommandLine> + 'a {
        let scanner = *self;
        text.lines().filter_map(move |line| scanner.extract(line))
    }

    /// Extract the command from a single physical line, if it holds one.
    pub fn extract(&self, line: &str) -> Option<CommandLine> {
        let rest = line.trim().strip_prefix(self.marker)?;
        match rest.chars().next() {
            Some(c) if !c.is_whitespace() => Some(CommandLine::new(rest)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        scan(input).into_iter().map(|c| c.as_str().to_string()).collect()
    }

    #[test]
    fn single_command() {
        assert_eq!(texts("/help"), vec!["help"]);
    }

    #[test]
    fn leading_space() {
        assert_eq!(texts(" /status"), vec!["status"]);
    }

    #[test]
    fn leading_tab() {
        assert_eq!(texts("\t/command"), vec!["command"]);
    }

    #[test]
    fn only_first_marker_counts() {
        assert_eq!(texts("/help /status"), vec!["help /status"]);
    }

    #[test]
    fn one_command_per_line() {
        assert_eq!(texts("/help\n/status\n/quit"), vec!["help", "status", "quit"]);
    }

    #[test]
    fn trailing_text_is_kept() {
        assert_eq!(texts("/help me with this"), vec!["help me with this"]);
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        assert_eq!(texts("  /close wontfix   \r\n"), vec!["close wontfix"]);
    }

    #[test]
    fn text_before_marker_does_not_match() {
        assert!(texts("Please use /help for assistance").is_empty());
        assert!(texts("Use /help for help\nTry /status for status").is_empty());
    }

    #[test]
    fn marker_inside_word_does_not_match() {
        assert!(texts("http://example.com").is_empty());
        assert!(texts("The file is in home/user/documents").is_empty());
    }

    #[test]
    fn bare_marker_does_not_match() {
        assert!(texts("/").is_empty());
        assert!(texts("   /   ").is_empty());
    }

    #[test]
    fn whitespace_after_marker_does_not_match() {
        assert!(texts("/ close").is_empty());
    }

    #[test]
    fn empty_text() {
        assert!(texts("").is_empty());
    }

    #[test]
    fn mixed_text_and_commands() {
        assert_eq!(
            texts("Hello /world\nThis is a test /check this out\n/final"),
            vec!["final"]
        );
        assert_eq!(
            texts("Hello world\n/help\nRegular text\n  /status"),
            vec!["help", "status"]
        );
    }

    #[test]
    fn custom_marker() {
        let scanner = Scanner::new('!');
        let found: Vec<String> = scanner
            .scan("/close\n!close now")
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(found, vec!["close now"]);
    }

    #[test]
    fn lazy_iteration_is_restartable() {
        let scanner = Scanner::default();
        let text = "/a\n/b";
        assert_eq!(scanner.commands(text).count(), 2);
        assert_eq!(scanner.commands(text).count(), 2);
    }
}
