use thiserror::Error;

/// Error returned by [`parse_hex`](crate::parse_hex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// More than 8 digits after the optional `0x` prefix.
    #[error("Hex string too long.")]
    TooLong,
    /// No digits after the optional `0x` prefix.
    #[error("Hex string is empty.")]
    Empty,
    /// A character that is not a hex digit.
    #[error("Bad character in hex string: {0}")]
    InvalidCharacter(char),
}

/// Error returned by a console command handler.
///
/// The `Display` text is what the console prints after `Error: `.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError<'a> {
    /// A numeric argument failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Address argument above [`ADDR_MAX`](crate::ADDR_MAX).
    #[error("Address too large.")]
    AddressTooLarge,
    /// Value argument does not fit the access width.
    #[error("Value too large.")]
    ValueTooLarge,
    /// Required arguments are missing.
    #[error("Too few arguments.")]
    TooFewArguments {
        /// Usage text printed after the error.
        usage: &'static str,
    },
    /// First token does not name a command.
    #[error("Unknown command: {0}")]
    UnknownCommand(&'a str),
    /// Writing to the console failed.
    #[error("Output error.")]
    Output(#[from] core::fmt::Error),
}
