//! Colored terminal messages.
//!
//! `colored` honours NO_COLOR, CLICOLOR and CLICOLOR_FORCE. Status goes to
//! stdout, errors to stderr; script and leaf data are printed uncolored.

use std::fmt::Display;

use colored::Colorize;

pub fn error(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// One link of an error's source chain, below [`error`].
pub fn cause(msg: &(impl Display + ?Sized)) {
    eprintln!("  {} {}", "caused by:".dimmed(), msg);
}

pub fn success(msg: &(impl Display + ?Sized)) {
    println!("{} {}", "✓".green(), msg);
}

/// Indented check mark, for entries of a listing
pub fn success_detail(msg: &(impl Display + ?Sized)) {
    println!("  {} {}", "✓".green(), msg);
}

/// Indented cross, for entries of a listing
pub fn failure(msg: &(impl Display + ?Sized)) {
    println!("  {} {}", "✗".red(), msg);
}

/// `Label: msg` with a green label, e.g. `Created: noncn.toml`
pub fn action(label: &str, msg: &(impl Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

pub fn header(msg: &(impl Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Uncolored data output
pub fn info(msg: &(impl Display + ?Sized)) {
    println!("{}", msg);
}
