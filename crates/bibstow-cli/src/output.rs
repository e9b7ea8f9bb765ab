use std::io::Write;

use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print a BibTeX entry with light syntax highlighting.
///
/// Line-oriented: the `@type{key,` header gets the entry type and citation
/// key colored, `field = value` lines get the field name colored. Anything
/// unrecognized is printed verbatim, so malformed lines never disappear.
pub fn print_entry(w: &mut dyn Write, entry: &str, color: ColorMode) -> std::io::Result<()> {
    if !color.enabled() {
        return writeln!(w, "{}", entry.trim_end());
    }

    for line in entry.trim_end().lines() {
        writeln!(w, "{}", highlight_line(line))?;
    }
    Ok(())
}

fn highlight_line(line: &str) -> String {
    let trimmed = line.trim_start();

    // Entry header: @article{key,
    if trimmed.starts_with('@') {
        if let Some(brace) = line.find('{') {
            let (header, rest) = line.split_at(brace + 1);
            let entry_type = &header[..brace];
            let key = rest.trim_end_matches(',');
            let comma = if rest.ends_with(',') { "," } else { "" };
            return format!(
                "{}{{{}{}",
                entry_type.magenta().bold(),
                key.yellow(),
                comma
            );
        }
        return format!("{}", line.magenta().bold());
    }

    // Field line: name = value
    if let Some(eq) = line.find('=') {
        let (name, rest) = line.split_at(eq);
        return format!("{}{}", name.cyan(), rest);
    }

    line.to_string()
}
