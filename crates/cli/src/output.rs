//! Command output on stdout. Logs go to stderr.

#![allow(clippy::print_stdout)]

use serde::Serialize;

use crate::error::CliError;

/// Print a value as pretty JSON.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a server acknowledgement, if it carried anything.
pub fn ack(message: &str, body: &serde_json::Value) -> Result<(), CliError> {
    println!("{message}");
    if !body.is_null() {
        json(body)?;
    }
    Ok(())
}

/// Print one line.
pub fn line(text: impl std::fmt::Display) {
    println!("{text}");
}
