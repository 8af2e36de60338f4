//! Interactive prompts.

use anyhow::{Result, bail};
use inquire::{Password, Text};
use zeroize::Zeroizing;

/// Use `val` if given, otherwise ask for it.
pub fn text_when_none(prompt: &str, val: Option<String>) -> Result<String> {
    Ok(match val {
        Some(val) => val,
        None => Text::new(prompt).prompt()?,
    })
}

/// Like [`text_when_none`], but an empty answer is rejected.
pub fn required_text_when_none(prompt: &str, val: Option<String>) -> Result<String> {
    let value = text_when_none(prompt, val)?;
    require(prompt, value)
}

/// Ask for a secret without echo. Empty input is rejected.
pub fn secret(prompt: &str) -> Result<Zeroizing<String>> {
    let value = Zeroizing::new(Password::new(prompt).without_confirmation().prompt()?);
    if value.trim().is_empty() {
        bail!("{prompt} is required");
    }
    Ok(value)
}

/// Use `val` if given, otherwise ask for it without echo.
pub fn secret_when_none(prompt: &str, val: Option<String>) -> Result<Zeroizing<String>> {
    match val {
        Some(val) => Ok(Zeroizing::new(require(prompt, val)?)),
        None => secret(prompt),
    }
}

fn require(prompt: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        bail!("{prompt} is required");
    }
    Ok(value)
}
