use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "STREAMCRYPT_PASSWORD";

/// Reads the passphrase for an existing stream.
///
/// `stdin_is_data` is set when the input stream itself comes from stdin, in
/// which case stdin is never consumed for the passphrase.
pub fn read_password(stdin_is_data: bool) -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env() {
        return Ok(pw);
    }

    //  stdin (Pipeline)
    //  echo "supersecretpassphrase" | streamcrypt decrypt in.enc out.txt
    if !stdin_is_data && !io::stdin().is_terminal() {
        return from_stdin_line();
    }

    let pw = Zeroizing::new(rpassword::prompt_password("Password: ").context("no password provided")?);
    if pw.is_empty() {
        bail!("No password provided");
    }
    Ok(pw)
}

/// Reads the passphrase for a new stream, asking twice on a terminal.
pub fn read_new_password_with_confirmation(stdin_is_data: bool) -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env() {
        return Ok(pw);
    }

    if !stdin_is_data && !io::stdin().is_terminal() {
        return from_stdin_line();
    }

    let pw1 = Zeroizing::new(rpassword::prompt_password("New password: ").context("no password provided")?);
    let pw2 = Zeroizing::new(rpassword::prompt_password("Confirm password: ").context("no password provided")?);

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

//  Environment Variable
//  STREAMCRYPT_PASSWORD="supersecretpassphrase" streamcrypt encrypt in.txt out.enc
fn from_env() -> Option<Zeroizing<String>> {
    match std::env::var(PASSWORD_ENV) {
        Ok(pw) if !pw.is_empty() => Some(Zeroizing::new(pw)),
        _ => None,
    }
}

fn from_stdin_line() -> Result<Zeroizing<String>> {
    let mut buf = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut buf)?;
    trim_newline(&mut buf);

    if buf.is_empty() {
        bail!("No password provided");
    }
    Ok(buf)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
