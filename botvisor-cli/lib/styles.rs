use clap::builder::styling::{AnsiColor, Effects, Styles};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Terminal styling for text printed by the CLI.
pub trait AnsiStyles {
    /// Styles a section header.
    fn header(&self) -> String;

    /// Styles a literal the user can type, such as a flag or a name.
    fn literal(&self) -> String;

    /// Styles something that went wrong.
    fn error(&self) -> String;
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The clap help styles.
pub fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<T: AsRef<str>> AnsiStyles for T {
    fn header(&self) -> String {
        console::style(self.as_ref()).yellow().bold().to_string()
    }

    fn literal(&self) -> String {
        console::style(self.as_ref()).blue().bold().to_string()
    }

    fn error(&self) -> String {
        console::style(self.as_ref()).red().bold().to_string()
    }
}
