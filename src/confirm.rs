//! Operator prompts: yes/no confirmations and hidden password entry.

use anyhow::{bail, Context, Result};
use dialoguer::Password;
use std::io::{BufRead, Write};

/// Answer used when the operator just presses enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

/// Ask a yes/no question on `output`, reading the reply from `input`.
///
/// Prints `<message>\n(Y/n): ` or `(y/N): `. An empty reply takes the
/// default; `y` or `yes` (any case) accepts; anything else declines. End of
/// input is an error, so a closed stdin never counts as consent.
pub fn yes_no<R: BufRead, W: Write>(
    message: &str,
    default: Answer,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    let choices = match default {
        Answer::Yes => "Y/n",
        Answer::No => "y/N",
    };
    write!(output, "{message}\n({choices}): ")?;
    output.flush()?;

    let mut reply = String::new();
    let read = input
        .read_line(&mut reply)
        .context("reading confirmation")?;
    if read == 0 {
        bail!("no answer to confirmation (end of input)");
    }

    let reply = reply.trim().to_ascii_lowercase();
    Ok(match reply.as_str() {
        "" => default == Answer::Yes,
        "y" | "yes" => true,
        _ => false,
    })
}

/// Read a secret without echoing it.
///
/// When `confirm` is set the secret is asked for twice and must match.
/// Empty secrets are asked for again.
pub fn read_secret(prompt: &str, confirm: bool) -> Result<String> {
    let mut password = Password::new().with_prompt(prompt);
    if confirm {
        password =
            password.with_confirmation(format!("Confirm {prompt}"), "passwords do not match");
    }
    password
        .interact()
        .with_context(|| format!("reading '{prompt}' from the terminal"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn answer(reply: &str, default: Answer) -> Result<bool> {
        let mut input = Cursor::new(reply.as_bytes().to_vec());
        let mut output = Vec::new();
        yes_no("Erase /dev/sda?", default, &mut input, &mut output)
    }

    #[test]
    fn test_prompt_text() {
        let mut input = Cursor::new(b"y\n".to_vec());
        let mut output = Vec::new();
        yes_no("Erase /dev/sda?", Answer::No, &mut input, &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Erase /dev/sda?\n(y/N): ");
    }

    #[test]
    fn test_empty_reply_takes_default() {
        assert!(answer("\n", Answer::Yes).unwrap());
        assert!(!answer("\n", Answer::No).unwrap());
    }

    #[test]
    fn test_explicit_replies() {
        assert!(answer("YES\n", Answer::No).unwrap());
        assert!(answer("  y \n", Answer::No).unwrap());
        assert!(!answer("n\n", Answer::Yes).unwrap());
        assert!(!answer("sure\n", Answer::Yes).unwrap());
    }

    #[test]
    fn test_end_of_input_is_error() {
        assert!(answer("", Answer::Yes).is_err());
    }

    #[test]
    fn test_secret_needs_a_terminal() {
        use std::io::IsTerminal;
        if std::io::stderr().is_terminal() {
            return;
        }
        let err = read_secret("Root password", true).unwrap_err();
        assert!(err.to_string().contains("Root password"));
    }
}
