use std::io::{self, BufRead, Write};

use crate::error::{CryptbakError, Result};

/// Operator interaction: passphrases and confirmations.
pub trait Console {
    fn passphrase(&self, prompt: &str) -> Result<String>;
    fn ask(&self, prompt: &str) -> Result<String>;
}

pub struct Terminal;

impl Console for Terminal {
    fn passphrase(&self, prompt: &str) -> Result<String> {
        rpassword::prompt_password(prompt)
            .map_err(|e| CryptbakError::message(format!("read passphrase: {}", e)))
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        print!("{}", prompt);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Prompt for a new passphrase twice; both entries must match and be
/// non-empty.
pub fn new_passphrase(console: &dyn Console, device: &str) -> Result<String> {
    let first = console.passphrase(&format!("New passphrase for {}: ", device))?;
    if first.is_empty() {
        return Err(CryptbakError::usage("passphrase must not be empty"));
    }
    let second = console.passphrase("Repeat passphrase: ")?;
    if first != second {
        return Err(CryptbakError::usage("passphrases do not match"));
    }
    Ok(first)
}
