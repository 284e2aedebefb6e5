use std::fmt::Display;
use std::time::Instant;

use console::Style;
use indicatif::ProgressStyle;
use indicatif::style::TemplateError;

const ANSI_BLUE: Style = Style::new().blue();

/// Style of the progress bar shown while a deck is evaluated.
pub(crate) fn get_style_deck() -> Result<ProgressStyle, TemplateError> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("=>-"))
}

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}
