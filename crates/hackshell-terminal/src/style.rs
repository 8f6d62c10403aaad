//! Terminal coloring that switches off when output is piped onward.

use dialoguer::console::{StyledObject, style};

/// Apply `decorate` to `text` unless `plain` is set.
pub fn paint<'a>(
    text: &'a str,
    plain: bool,
    decorate: impl FnOnce(StyledObject<&'a str>) -> StyledObject<&'a str>,
) -> String {
    if plain {
        text.to_string()
    } else {
        decorate(style(text)).to_string()
    }
}

pub fn directory(name: &str, plain: bool) -> String {
    paint(name, plain, |s| s.blue().bold())
}

pub fn executable(name: &str, plain: bool) -> String {
    paint(name, plain, |s| s.green())
}

pub fn header(text: &str, plain: bool) -> String {
    paint(text, plain, |s| s.bold())
}

pub fn warning(text: &str, plain: bool) -> String {
    paint(text, plain, |s| s.yellow())
}

pub fn highlight(text: &str, plain: bool) -> String {
    paint(text, plain, |s| s.red().bold())
}
