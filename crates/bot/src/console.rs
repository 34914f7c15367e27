//! Line-oriented console commands

/// Accepted theme length in characters
pub const THEME_LEN: std::ops::RangeInclusive<usize> = 3..=255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/new <theme>`: open a ticket and connect to it
    New(String),
    /// `/quit`
    Quit,
    /// Anything else is sent to the active room
    Say(String),
    Empty,
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if line == "/quit" {
        return Command::Quit;
    }
    if line == "/new" {
        return Command::New(String::new());
    }
    if let Some(theme) = line.strip_prefix("/new ") {
        return Command::New(theme.trim().to_string());
    }
    Command::Say(line.to_string())
}

/// Check a ticket theme before it is sent to the backend
pub fn validate_theme(theme: &str) -> Result<&str, String> {
    let len = theme.chars().count();
    if THEME_LEN.contains(&len) {
        Ok(theme)
    } else {
        Err(format!(
            "Theme must be {} to {} characters long (got {})",
            THEME_LEN.start(),
            THEME_LEN.end(),
            len
        ))
    }
}
