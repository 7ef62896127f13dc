//! Terminal rendering of markdown replies via termimad, with a plain text
//! fallback.

use termimad::{crossterm::style::Color, MadSkin};

/// Terminal renderer that can switch between rich and plain text output
#[derive(Clone)]
pub struct TerminalRenderer {
    rich_enabled: bool,
    skin: MadSkin,
}

impl TerminalRenderer {
    pub fn new(rich_enabled: bool) -> Self {
        let mut skin = MadSkin::default();
        skin.set_headers_fg(Color::Cyan);
        skin.bold.set_fg(Color::Yellow);
        skin.italic.set_fg(Color::Magenta);
        skin.inline_code.set_bg(Color::AnsiValue(238));

        Self { rich_enabled, skin }
    }

    /// Prints markdown to stdout.
    pub fn render(&self, markdown: &str) {
        if !self.rich_enabled {
            print!("{markdown}");
            if !markdown.ends_with('\n') {
                println!();
            }
            return;
        }

        for line in markdown.lines() {
            // Headers keep their hashes so listings stay greppable.
            if line.starts_with('#') {
                println!("\x1b[36m{line}\x1b[0m");
            } else {
                self.skin.print_inline(line);
                println!();
            }
        }
    }

    /// Prints markdown to stderr, always plain.
    pub fn render_error(&self, markdown: &str) {
        eprintln!("{}", markdown.trim_end());
    }
}
